use super::common::*;
use std::sync::Arc;

use crate::governance::directory::EmployeeFilter;
use crate::governance::domain::{EmployeeId, RequestStatus, TurnoverKind};
use crate::governance::GovernanceError;

#[test]
fn unplanned_hire_into_full_department_is_refused() {
    let engine = engine(&[("eng", 2)]);
    staff(&engine, "eng", 2);

    let err = engine
        .directory()
        .hire(&dept("eng"), &position_of("eng"), attributes("Late"), None)
        .expect_err("department is full");
    assert!(matches!(err, GovernanceError::CapacityExceeded(_)));
    assert_eq!(
        engine
            .directory()
            .list(&EmployeeFilter::default())
            .expect("list")
            .len(),
        2
    );
    assert_eq!(figures(&engine, "eng"), (2, 2, 0));
}

#[test]
fn hires_fulfilling_an_approved_request_consume_its_reservation() {
    let engine = engine(&[("eng", 10)]);
    staff(&engine, "eng", 8);
    let request_no = submitted(&engine, "eng", 2);
    engine
        .requests()
        .approve(&request_no, &manager(), None)
        .expect("fits");

    for name in ["Ada", "Alan"] {
        let hired = engine
            .directory()
            .hire(
                &dept("eng"),
                &position_of("eng"),
                attributes(name),
                Some(&request_no),
            )
            .expect("reserved seat is filled");
        assert_eq!(hired.fulfilled_request.as_ref(), Some(&request_no));
    }
    assert_eq!(figures(&engine, "eng"), (10, 10, 0));

    let request = engine.requests().get(&request_no).expect("exists");
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.fulfillment.filled, 2);
    assert_eq!(request.remaining_reservation(), 0);

    let err = engine
        .directory()
        .hire(
            &dept("eng"),
            &position_of("eng"),
            attributes("Extra"),
            Some(&request_no),
        )
        .expect_err("reservation is used up");
    assert!(matches!(err, GovernanceError::Validation(_)));
    assert_eq!(figures(&engine, "eng"), (10, 10, 0));
}

#[test]
fn fulfilling_hire_must_match_an_approved_request_of_its_department() {
    let engine = engine(&[("eng", 5), ("ops", 5)]);
    let pending = submitted(&engine, "eng", 1);

    let err = engine
        .directory()
        .hire(
            &dept("eng"),
            &position_of("eng"),
            attributes("Early"),
            Some(&pending),
        )
        .expect_err("request is still pending");
    assert!(matches!(err, GovernanceError::InvalidTransition { .. }));

    engine
        .requests()
        .approve(&pending, &manager(), None)
        .expect("fits");
    let err = engine
        .directory()
        .hire(
            &dept("ops"),
            &position_of("ops"),
            attributes("Elsewhere"),
            Some(&pending),
        )
        .expect_err("request reserves eng headcount");
    assert!(matches!(err, GovernanceError::Validation(_)));
    assert_eq!(figures(&engine, "eng"), (5, 0, 1));
    assert_eq!(figures(&engine, "ops"), (5, 0, 0));
}

#[test]
fn hire_validates_placement() {
    let engine = engine(&[("eng", 5), ("ops", 5)]);
    let err = engine
        .directory()
        .hire(&dept("eng"), &position_of("ops"), attributes("Misfiled"), None)
        .expect_err("position belongs to ops");
    assert!(matches!(err, GovernanceError::Validation(_)));

    let mut nameless = attributes("x");
    nameless.first_name = "  ".to_string();
    assert!(matches!(
        engine
            .directory()
            .hire(&dept("eng"), &position_of("eng"), nameless, None),
        Err(GovernanceError::Validation(_))
    ));
    assert_eq!(figures(&engine, "eng"), (5, 0, 0));
}

#[test]
fn resignation_frees_the_seat_once() {
    let engine = engine(&[("eng", 3)]);
    let employee = staff(&engine, "eng", 1).remove(0);

    let err = engine
        .directory()
        .resign(&employee.id, date(2020, 1, 1), None)
        .expect_err("resigned before being hired");
    assert!(matches!(err, GovernanceError::Validation(_)));

    let resigned = engine
        .directory()
        .resign(&employee.id, date(2025, 9, 30), Some("Relocating"))
        .expect("resigns");
    assert_eq!(resigned.resign_date, Some(date(2025, 9, 30)));
    assert!(!resigned.is_active());
    assert_eq!(figures(&engine, "eng"), (3, 0, 0));

    assert!(matches!(
        engine
            .directory()
            .resign(&employee.id, date(2025, 10, 1), None),
        Err(GovernanceError::InvalidTransition { .. })
    ));
    assert_eq!(figures(&engine, "eng"), (3, 0, 0));
    assert!(matches!(
        engine
            .directory()
            .resign(&EmployeeId::new("EMP-999999"), date(2025, 10, 1), None),
        Err(GovernanceError::NotFound { .. })
    ));
}

#[test]
fn refused_transfer_leaves_employee_and_departments_untouched() {
    let engine = engine(&[("alpha", 5), ("beta", 4)]);
    let mover = staff(&engine, "alpha", 1).remove(0);
    staff(&engine, "beta", 4);

    let err = engine
        .directory()
        .transfer_department(&mover.id, &dept("beta"), &position_of("beta"), date(2025, 6, 1))
        .expect_err("beta is full");
    assert!(matches!(err, GovernanceError::CapacityExceeded(_)));

    assert_eq!(engine.directory().get(&mover.id).expect("exists"), mover);
    assert_eq!(figures(&engine, "alpha").1, 1);
    assert_eq!(figures(&engine, "beta").1, 4);
}

#[test]
fn transfer_moves_the_employee_and_logs_turnover() {
    let engine = engine(&[("alpha", 5), ("beta", 4)]);
    let mover = staff(&engine, "alpha", 1).remove(0);

    assert!(matches!(
        engine.directory().transfer_department(
            &mover.id,
            &dept("alpha"),
            &position_of("alpha"),
            date(2025, 6, 1)
        ),
        Err(GovernanceError::NoOp(_))
    ));

    let moved = engine
        .directory()
        .transfer_department(&mover.id, &dept("beta"), &position_of("beta"), date(2025, 6, 1))
        .expect("beta has room");
    assert_eq!(moved.department_id, dept("beta"));
    assert_eq!(moved.position_id, position_of("beta"));
    assert_eq!(figures(&engine, "alpha").1, 0);
    assert_eq!(figures(&engine, "beta").1, 1);

    let kinds = engine
        .directory()
        .turnover()
        .expect("turnover")
        .into_iter()
        .map(|event| event.kind)
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![TurnoverKind::Join, TurnoverKind::Transfer]);
}

#[test]
fn failed_employee_insert_reverts_occupancy_and_claim() {
    let engine = engine_with(&[("eng", 4)], |stores| {
        stores.employees = Arc::new(RejectingInsertEmployees::default())
    });
    let request_no = submitted(&engine, "eng", 2);
    engine
        .requests()
        .approve(&request_no, &manager(), None)
        .expect("fits");

    let err = engine
        .directory()
        .hire(
            &dept("eng"),
            &position_of("eng"),
            attributes("Ghost"),
            Some(&request_no),
        )
        .expect_err("employee store is offline");
    assert!(matches!(err, GovernanceError::Storage(_)));

    assert_eq!(figures(&engine, "eng"), (4, 0, 2));
    let request = engine.requests().get(&request_no).expect("exists");
    assert_eq!(request.fulfillment.filled, 0);
    assert_eq!(request.remaining_reservation(), 2);
}

#[test]
fn active_headcount_tracks_the_ledger() {
    let engine = engine(&[("eng", 6)]);
    let team = staff(&engine, "eng", 4);
    engine
        .directory()
        .resign(&team[0].id, date(2025, 12, 31), None)
        .expect("resigns");

    let active = engine
        .directory()
        .active_headcount(&dept("eng"))
        .expect("count");
    assert_eq!(active, 3);
    assert_eq!(figures(&engine, "eng").1, active);

    let everyone = engine
        .directory()
        .list(&EmployeeFilter {
            department_id: Some(dept("eng")),
            active_only: false,
        })
        .expect("list");
    assert_eq!(everyone.len(), 4);
}
