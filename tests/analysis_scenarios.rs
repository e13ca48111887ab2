//! End-to-end runs through the analysis workflows.

mod common;

use approx::assert_relative_eq;
use serde_json::json;
use std::fs;
use tokio_util::sync::CancellationToken;

use common::{synthesize, Fixture};
use sasfit_rs::composition::{CompositionSpec, RadiusEffectiveMode};
use sasfit_rs::dispatch::{RunState, RunStatus, STATUS_FILE};
use sasfit_rs::{FitStatus, SasFitError};

fn cylinder_truth() -> CompositionSpec {
    CompositionSpec::new("cylinder")
}

fn cylinder_overrides() -> serde_json::Value {
    json!({
        "radius": {"value": 20, "min": 1, "max": 200, "vary": true},
        "length": {"value": 400, "min": 10, "max": 4000, "vary": true},
        "scale": {"value": 1.0, "min": 0.0, "max": 10, "vary": true},
        "background": {"value": 0.001, "min": 0, "max": 1, "vary": true},
    })
}

#[tokio::test]
async fn test_cylinder_fit_converges() {
    let fixture = Fixture::new();
    fixture.upload("cylinder.csv", &synthesize(&cylinder_truth(), 100, 7));

    let result = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({
                "input_csv": "cylinder.csv",
                "model": "cylinder",
                "engine": "bumps",
                "method": "amoeba",
                "param_overrides": cylinder_overrides(),
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, FitStatus::Converged, "{}", result.message);
    assert_eq!(result.model, "cylinder");
    assert_eq!(result.n_free, 4);
    assert_relative_eq!(result.parameter("radius").unwrap().value, 20.0, max_relative = 0.1);
    assert_relative_eq!(result.parameter("length").unwrap().value, 400.0, max_relative = 0.1);
    assert!(result.reduced_chisq < 3.0, "reduced chi-square {}", result.reduced_chisq);

    let sld = result.parameter("sld").unwrap();
    assert!(!sld.vary);
    assert_eq!(sld.uncertainty, None);

    let workspace = result.artifacts.workspace.clone().unwrap();
    assert!(workspace.starts_with(fixture.runs_dir().join("fitting-with-custom-model")));
    assert!(result.artifacts.plot.as_ref().unwrap().is_file());
    let status: RunStatus =
        serde_json::from_slice(&fs::read(workspace.join(STATUS_FILE)).unwrap()).unwrap();
    assert_eq!(status.state, RunState::Succeeded);
}

#[tokio::test]
async fn test_linked_radius_is_not_fitted() {
    let fixture = Fixture::new();
    let truth = CompositionSpec {
        structure_factor: Some("hardsphere".to_string()),
        radius_effective_mode: RadiusEffectiveMode::LinkRadius,
        ..cylinder_truth()
    };
    fixture.upload("dense.csv", &synthesize(&truth, 80, 11));

    let request = |mode: &str| {
        json!({
            "input_csv": "dense.csv",
            "model": "cylinder",
            "structure_factor": "hardsphere",
            "radius_effective_mode": mode,
            "param_overrides": cylinder_overrides(),
            "structure_factor_params": {"radius_effective": {"vary": true, "min": 1, "max": 500}},
        })
    };

    let linked = fixture
        .context
        .run_analysis("fitting-with-custom-model", request("link_radius"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(linked.model, "cylinder@hardsphere");
    assert!(linked.parameter("radius_effective").is_none());
    assert!(linked.parameter("volfraction").is_some());
    assert_eq!(linked.n_free, 4);

    let free = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            request("unconstrained"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let radius_effective = free.parameter("radius_effective").unwrap();
    assert!(radius_effective.vary);
    assert_eq!(free.n_free, 5);
}

#[tokio::test]
async fn test_cylinder_template() {
    let fixture = Fixture::new();
    fixture.upload("alice/cylinder.csv", &synthesize(&cylinder_truth(), 100, 3));

    let result = fixture
        .context
        .run_analysis(
            "fitting-with-cylinder-model",
            json!({"input_csv": "cylinder.csv", "user_id": "alice", "plot_log_scale": false}),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(
        matches!(result.status, FitStatus::Converged | FitStatus::MaxIterations),
        "{:?}",
        result.status
    );
    assert_eq!(result.n_free, 4);
    assert_eq!(result.engine, "bumps");
    assert_eq!(result.method, "amoeba");
    assert_relative_eq!(result.parameter("radius").unwrap().value, 20.0, max_relative = 0.1);
}

#[tokio::test]
async fn test_lmfit_leastsq_reports_uncertainties() {
    let fixture = Fixture::new();
    fixture.upload("cylinder.csv", &synthesize(&cylinder_truth(), 100, 5));

    let result = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({
                "input_csv": "cylinder.csv",
                "model": "cylinder",
                "engine": "lmfit",
                "param_overrides": {
                    "radius": {"value": 22, "min": 1, "max": 200, "vary": true},
                    "length": {"value": 380, "min": 10, "max": 4000, "vary": true},
                },
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.method, "leastsq");
    assert_eq!(result.status, FitStatus::Converged, "{}", result.message);
    let radius = result.parameter("radius").unwrap();
    assert_relative_eq!(radius.value, 20.0, max_relative = 0.05);
    let stderr = radius.uncertainty.unwrap();
    assert!(stderr > 0.0 && stderr < 2.0, "radius stderr {stderr}");
}

#[tokio::test]
async fn test_out_of_bounds_override_fails_before_dispatch() {
    let fixture = Fixture::new();
    fixture.upload("cylinder.csv", &synthesize(&cylinder_truth(), 40, 1));

    let err = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({
                "input_csv": "cylinder.csv",
                "model": "cylinder",
                "param_overrides": {"radius": {"value": 300, "min": 1, "max": 200}},
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SasFitError::OutOfBounds { ref name, .. } if name == "radius"));
    assert_eq!(err.code(), "out_of_bounds");
    assert!(!fixture.runs_dir().exists());
}

#[tokio::test]
async fn test_composition_errors_leave_no_workspace() {
    let fixture = Fixture::new();
    fixture.upload("cylinder.csv", &synthesize(&cylinder_truth(), 40, 1));

    let err = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({
                "input_csv": "cylinder.csv",
                "model": "cylinder",
                "polydispersity": {"sld": {"pd_width": 0.1}},
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SasFitError::UnsupportedPolydispersity { .. }));

    let err = fixture
        .context
        .run_analysis(
            "fitting-with-sphere",
            json!({"input_csv": "cylinder.csv"}),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SasFitError::UnknownAnalysis(_)));
    assert!(!fixture.runs_dir().exists());
}

#[tokio::test]
async fn test_missing_data_file() {
    let fixture = Fixture::new();
    let err = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({"input_csv": "nothing.csv", "model": "sphere"}),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), sasfit_rs::ErrorKind::Io);
}

#[tokio::test]
async fn test_cancelled_run_keeps_workspace() {
    let fixture = Fixture::new();
    fixture.upload("cylinder.csv", &synthesize(&cylinder_truth(), 40, 2));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fixture
        .context
        .run_analysis(
            "fitting-with-custom-model",
            json!({
                "input_csv": "cylinder.csv",
                "model": "cylinder",
                "param_overrides": cylinder_overrides(),
            }),
            cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SasFitError::Cancelled));

    let analysis_dir = fixture.runs_dir().join("fitting-with-custom-model");
    let run_dir = fs::read_dir(analysis_dir).unwrap().next().unwrap().unwrap().path();
    let status: RunStatus =
        serde_json::from_slice(&fs::read(run_dir.join(STATUS_FILE)).unwrap()).unwrap();
    assert_eq!(status.state, RunState::Cancelled);
}
