use chrono::NaiveDate;
use headcount::config::GovernanceConfig;
use headcount::error::AppError;
use headcount::governance::memory::InMemoryMasterData;
use headcount::governance::seed::{SeedData, SeedSummary};
use headcount::governance::{EngineSettings, HeadcountEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const DEMO_SEED: &str = include_str!("../seed/demo.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn demo_seed() -> Result<SeedData, AppError> {
    Ok(SeedData::from_json(DEMO_SEED)?)
}

pub(crate) fn load_seed(path: Option<&Path>) -> Result<Option<SeedData>, AppError> {
    path.map(SeedData::from_path)
        .transpose()
        .map_err(AppError::from)
}

/// Build an in-memory engine, optionally pre-populated from a seed.
/// Without a seed the engine starts with no departments.
pub(crate) fn build_engine(
    config: &GovernanceConfig,
    seed: Option<&SeedData>,
) -> Result<(Arc<HeadcountEngine>, SeedSummary), AppError> {
    let settings = EngineSettings::from_config(config);
    let Some(seed) = seed else {
        let engine = HeadcountEngine::in_memory(Arc::new(InMemoryMasterData::default()), settings);
        return Ok((Arc::new(engine), SeedSummary::default()));
    };

    let engine = HeadcountEngine::in_memory(Arc::new(seed.master_data()?), settings);
    let summary = seed.populate(&engine)?;
    Ok((Arc::new(engine), summary))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_seed_fills_every_department() {
        let seed = demo_seed().expect("demo seed parses");
        let (engine, summary) =
            build_engine(&GovernanceConfig::default(), Some(&seed)).expect("engine builds");

        assert_eq!(summary.departments, 3);
        assert_eq!(summary.employees, 13);
        let overview = engine.capacity_overview().expect("overview");
        let occupied = overview
            .iter()
            .map(|row| (row.department.id.as_str(), row.capacity.occupied))
            .collect::<Vec<_>>();
        assert_eq!(occupied, vec![("ENG", 8), ("FIN", 1), ("OPS", 4)]);
    }

    #[test]
    fn engine_without_seed_starts_empty() {
        let (engine, summary) =
            build_engine(&GovernanceConfig::default(), None).expect("engine builds");
        assert_eq!(summary, SeedSummary::default());
        assert!(engine.capacity_overview().expect("overview").is_empty());
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2025-11-03 "),
            Ok(NaiveDate::from_ymd_opt(2025, 11, 3).expect("valid date"))
        );
        assert!(parse_date("03/11/2025").is_err());
    }
}
