//! Error propagation and budget behavior: callback failures abort with the
//! failing code, budget exhaustion is a reported partial success.

use krydav::config::{EigenMethod, EigenOptions};
use krydav::matrix::CsrMatrix;
use krydav::preconditioner::FnPreconditioner;
use krydav::solver::{EigenSolver, RunStatus};
use krydav::{EigenError, FnOperator, SerialComm};

#[test]
fn operator_failure_aborts_with_code() {
    let n = 30;
    let op = FnOperator::new(n, |_x, _y| 42);
    let opts = EigenOptions { num_evals: 2, ..Default::default() };
    let mut evals = [0.0; 2];
    let mut evecs = vec![0.0; n * 2];
    let mut rnorms = [0.0; 2];
    let err = EigenSolver::new(opts)
        .solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms)
        .unwrap_err();
    match err {
        EigenError::OperatorApply { code, .. } => assert_eq!(code, 42),
        other => panic!("expected an operator failure, got {other}"),
    }
}

#[test]
fn preconditioner_failure_aborts_with_code() {
    let n = 30;
    let op = CsrMatrix::<f64>::laplacian_1d(n);
    let pc = FnPreconditioner::new(|_r, _z| 7);
    let opts = EigenOptions {
        num_evals: 2,
        method: EigenMethod::MinMatvecs,
        ..Default::default()
    };
    let mut evals = [0.0; 2];
    let mut evecs = vec![0.0; n * 2];
    let mut rnorms = [0.0; 2];
    let err = EigenSolver::new(opts)
        .solve(&op, Some(&pc), &SerialComm, &mut evals, &mut evecs, &mut rnorms)
        .unwrap_err();
    match err {
        EigenError::PreconditionerApply { code, .. } => assert_eq!(code, 7),
        other => panic!("expected a preconditioner failure, got {other}"),
    }
}

#[test]
fn matvec_budget_is_a_partial_success() {
    let n = 100;
    let op = CsrMatrix::<f64>::laplacian_1d(n);
    let opts = EigenOptions {
        num_evals: 10,
        eps: 1e-12,
        max_matvecs: 30,
        method: EigenMethod::MinMatvecs,
        ..Default::default()
    };
    let mut evals = [0.0; 10];
    let mut evecs = vec![0.0; n * 10];
    let mut rnorms = [0.0; 10];
    let report = EigenSolver::new(opts)
        .solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms)
        .unwrap();
    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert!(report.converged < 10);
    // Outputs still hold the best available approximations.
    for j in 0..10 {
        assert!(evals[j].is_finite());
        assert!(rnorms[j].is_finite() && rnorms[j] >= 0.0);
        assert!(evals[j] > -1e-9 && evals[j] < 4.0 + 1e-9);
    }
}

#[test]
fn outer_iteration_budget_trips() {
    let n = 80;
    let op = CsrMatrix::<f64>::laplacian_1d(n);
    let opts = EigenOptions {
        num_evals: 5,
        eps: 1e-12,
        max_outer_iterations: 3,
        method: EigenMethod::MinMatvecs,
        ..Default::default()
    };
    let mut evals = [0.0; 5];
    let mut evecs = vec![0.0; n * 5];
    let mut rnorms = [0.0; 5];
    let report = EigenSolver::new(opts)
        .solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms)
        .unwrap();
    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert!(report.stats.outer_iterations <= 3);
}

#[test]
fn bad_configurations_are_rejected_up_front() {
    let n = 20;
    let op = CsrMatrix::<f64>::laplacian_1d(n);
    let mut evals = [0.0; 1];
    let mut evecs = vec![0.0; n];
    let mut rnorms = [0.0; 1];

    let opts = EigenOptions { num_evals: 0, ..Default::default() };
    assert!(matches!(
        EigenSolver::new(opts).solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms),
        Err(EigenError::InvalidConfig(_))
    ));

    let opts = EigenOptions { num_evals: 21, ..Default::default() };
    assert!(matches!(
        EigenSolver::new(opts).solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms),
        Err(EigenError::InvalidConfig(_))
    ));

    let opts = EigenOptions { num_evals: 1, eps: -1.0, ..Default::default() };
    assert!(matches!(
        EigenSolver::new(opts).solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms),
        Err(EigenError::InvalidConfig(_))
    ));
}

#[test]
fn no_matvecs_happen_after_a_config_error() {
    let n = 20;
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let op = FnOperator::new(n, |x, mut y| {
        counter.fetch_add(x.ncols(), std::sync::atomic::Ordering::Relaxed);
        let out = faer::Mat::<f64>::from_fn(x.nrows(), x.ncols(), |i, j| 2.0 * x[(i, j)]);
        y.copy_from(&out);
        0
    });
    let opts = EigenOptions { num_evals: 30, ..Default::default() };
    let mut evals = [0.0; 30];
    let mut evecs = vec![0.0; n * 30];
    let mut rnorms = [0.0; 30];
    let res =
        EigenSolver::new(opts).solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms);
    assert!(res.is_err());
    assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
}
