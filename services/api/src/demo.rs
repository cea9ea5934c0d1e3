use crate::infra::{build_engine, demo_seed, load_seed};
use chrono::{Datelike, Local, NaiveDate};
use clap::Args;
use headcount::config::GovernanceConfig;
use headcount::error::AppError;
use headcount::governance::{
    Actor, DepartmentCapacity, DepartmentId, EmployeeAttributes, EmployeeFilter, EmploymentType,
    GovernanceError, HeadcountEngine, NewManpowerPlan, NewManpowerRequest, PositionId,
    RequestType, Role,
};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct CapacityArgs {
    /// Seed file to load. Defaults to the bundled demo organisation.
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
    /// Emit the overview as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Hire and transfer date used by the walkthrough (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the workforce plan section of the demo.
    #[arg(long)]
    pub(crate) skip_plans: bool,
}

pub(crate) fn run_capacity_report(args: CapacityArgs) -> Result<(), AppError> {
    let seed = match load_seed(args.seed.as_deref())? {
        Some(seed) => seed,
        None => demo_seed()?,
    };
    let (engine, _) = build_engine(&GovernanceConfig::default(), Some(&seed))?;
    let overview = engine.capacity_overview()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    render_capacity(&overview);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let seed = demo_seed()?;
    let (engine, summary) = build_engine(&GovernanceConfig::default(), Some(&seed))?;

    println!("Headcount governance demo");
    println!(
        "- Seeded {} departments, {} positions, {} employees",
        summary.departments, summary.positions, summary.employees
    );
    render_capacity(&engine.capacity_overview()?);

    let engineering = DepartmentId::new("ENG");
    let backend = PositionId::new("ENG-BE");
    let lead = Actor::new("lead-eng", Role::Employee);
    let director = Actor::new("hr-director", Role::HrManager);

    println!("\nManpower requests for Engineering");
    let oversized = engine
        .requests()
        .create_request(backend_request(&engineering, &backend, 3), &lead)?;
    println!(
        "- {} asks for {} x {} -> {}",
        oversized.request_no, oversized.requested_headcount, backend, oversized.status
    );
    match engine.requests().approve(&oversized.request_no, &director, None) {
        Ok(decision) => println!("  Approved unexpectedly: {}", decision.request.status),
        Err(GovernanceError::CapacityExceeded(shortfall)) => println!(
            "  Refused: {} occupied + {} reserved + {} requested exceeds {}",
            shortfall.occupied, shortfall.reserved, shortfall.requested, shortfall.max_headcount
        ),
        Err(err) => return Err(err.into()),
    }
    engine.requests().reject(
        &oversized.request_no,
        &director,
        "Exceeds the engineering ceiling",
    )?;

    let sized = engine
        .requests()
        .create_request(backend_request(&engineering, &backend, 2), &lead)?;
    let decision = engine.requests().approve(
        &sized.request_no,
        &director,
        Some("Within budget for Q4"),
    )?;
    println!(
        "- {} asks for {} -> {} by {}",
        sized.request_no,
        sized.requested_headcount,
        decision.request.status,
        decision.approval.approver
    );
    render_department(&engine, &engineering)?;

    println!("\nHiring against the approved reservation");
    for name in ["Niklaus", "Tony"] {
        let hired = engine.directory().hire(
            &engineering,
            &backend,
            attributes(name, today),
            Some(&sized.request_no),
        )?;
        println!("- Hired {} as {}", hired.full_name().trim(), hired.id);
    }
    match engine
        .directory()
        .hire(&engineering, &backend, attributes("Walk-in", today), None)
    {
        Ok(hired) => println!("- Unplanned hire accepted: {}", hired.id),
        Err(err) => println!("- Unplanned hire refused: {err}"),
    }
    render_department(&engine, &engineering)?;

    println!("\nWorkforce moves");
    let operations = DepartmentId::new("OPS");
    let finance = DepartmentId::new("FIN");
    let sre = engine
        .directory()
        .list(&EmployeeFilter {
            department_id: Some(operations.clone()),
            active_only: true,
        })?
        .into_iter()
        .next();
    if let Some(sre) = sre {
        let moved = engine.directory().transfer_department(
            &sre.id,
            &finance,
            &PositionId::new("FIN-AN"),
            today,
        )?;
        println!(
            "- {} moved {} -> {}",
            moved.full_name(),
            operations,
            moved.department_id
        );
    }
    let analyst = engine
        .directory()
        .list(&EmployeeFilter {
            department_id: Some(finance.clone()),
            active_only: true,
        })?
        .into_iter()
        .next();
    if let Some(analyst) = analyst {
        match engine
            .directory()
            .transfer_department(&analyst.id, &engineering, &backend, today)
        {
            Ok(moved) => println!("- {} moved into {}", moved.full_name(), engineering),
            Err(err) => println!("- Transfer of {} refused: {err}", analyst.full_name()),
        }
        let resigned = engine
            .directory()
            .resign(&analyst.id, today, Some("Relocating"))?;
        println!("- {} resigned from {}", resigned.full_name(), finance);
    }
    println!(
        "- Turnover log holds {} events",
        engine.directory().turnover()?.len()
    );

    if !args.skip_plans {
        println!("\nWorkforce plans");
        let year = today.year() + 1;
        for (department, position, planned) in [
            ("ENG", "ENG-QA", 12),
            ("OPS", "OPS-SRE", 4),
            ("FIN", "FIN-AN", 3),
        ] {
            let plan = engine.plans().create(NewManpowerPlan {
                department_id: DepartmentId::new(department),
                position_id: PositionId::new(position),
                year,
                planned_headcount: planned,
            })?;
            println!(
                "- {} targets {} for {} (snapshot {})",
                plan.id, plan.planned_headcount, plan.department_id, plan.occupied_snapshot
            );
        }
        for deficit in engine.plans().deficit()? {
            println!(
                "  Deficit: {} short by {}",
                deficit.plan.department_id, deficit.shortfall
            );
        }
    }

    println!();
    render_capacity(&engine.capacity_overview()?);
    Ok(())
}

fn backend_request(
    department: &DepartmentId,
    position: &PositionId,
    headcount: u32,
) -> NewManpowerRequest {
    NewManpowerRequest {
        department_id: department.clone(),
        position_id: position.clone(),
        requested_headcount: headcount,
        request_type: RequestType::New,
        employment_type: EmploymentType::Permanent,
        reason: Some("Platform roadmap".to_string()),
    }
}

fn attributes(name: &str, hire_date: NaiveDate) -> EmployeeAttributes {
    EmployeeAttributes {
        first_name: name.to_string(),
        last_name: String::new(),
        employment_type: EmploymentType::Permanent,
        hire_date,
    }
}

fn render_department(engine: &HeadcountEngine, department: &DepartmentId) -> Result<(), AppError> {
    let snapshot = engine.quota().snapshot(department).map_err(GovernanceError::from)?;
    println!(
        "  {}: {} occupied | {} reserved | {} available of {}",
        department, snapshot.occupied, snapshot.reserved, snapshot.available, snapshot.max_headcount
    );
    Ok(())
}

fn render_capacity(overview: &[DepartmentCapacity]) {
    println!("Department capacity");
    for row in overview {
        println!(
            "- {} ({}): {}/{} occupied | {} reserved | {} available | {} active staff",
            row.department.name,
            row.department.id,
            row.capacity.occupied,
            row.capacity.max_headcount,
            row.capacity.reserved,
            row.capacity.available,
            row.active_employees
        );
    }
}
