mod common;
mod directory;
