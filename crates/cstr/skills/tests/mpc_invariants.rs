//! Property tests: the MPC skill never emits a coolant temperature outside the
//! rate window around the committed coolant or outside the input bounds.

use cstr_skills::mpc::OptimizerConfig;
use cstr_skills::{MpcConfig, MpcController, SkillController, SkillError, WithRiskChannel};
use cstr_types::{Action, Observation, SensorKey};
use proptest::prelude::*;

fn small_config() -> MpcConfig {
    MpcConfig {
        horizon: 4,
        optimizer: OptimizerConfig {
            max_iterations: 200,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn observation(ca: f64, t: f64, tc: f64, cref: f64) -> Observation {
    Observation::from_values([t, tc, ca, cref, t, cref - ca, (10.0 - ca) / 10.0, 10.0 - ca])
        .unwrap()
}

/// Coolant range reachable from `measured + prior` in one tick.
fn reachable(measured: f64, prior: f64) -> (f64, f64) {
    let baseline = measured + prior;
    (
        (baseline - 10.0).clamp(273.0, 322.0),
        (baseline + 10.0).clamp(273.0, 322.0),
    )
}

/// The emitted action, or `None` when the first tick has nothing to hold.
async fn act(
    mpc: &mut MpcController,
    obs: &Observation,
    prior: Action,
) -> Result<Option<Action>, TestCaseError> {
    match mpc.compute_action(obs, prior).await {
        Ok(action) => Ok(Some(action)),
        Err(SkillError::NoFallback) => Ok(None),
        Err(err) => Err(TestCaseError::fail(err.to_string())),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Plant states near the steady-state manifold between the two operating
/// points.
fn arb_plant() -> impl Strategy<Value = (f64, f64)> {
    (0.0f64..=1.0, -0.3f64..0.3, -3.0f64..3.0).prop_map(|(s, dca, dt)| {
        (
            8.5698 + (2.0 - 8.5698) * s + dca,
            311.2612 + (373.1311 - 311.2612) * s + dt,
        )
    })
}

/// Coolant temperatures inside the actuator range.
fn arb_coolant() -> impl Strategy<Value = f64> {
    273.0f64..322.0
}

fn arb_tick() -> impl Strategy<Value = u64> {
    0u64..100
}

/// Previous moves, including ones larger than a single tick allows.
fn arb_prior() -> impl Strategy<Value = f64> {
    -60.0f64..60.0
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn output_respects_rate_and_bounds(
        (ca, t) in arb_plant(),
        tc in arb_coolant(),
        cref in 1.0f64..9.0,
        warmup in 0usize..3,
    ) {
        let rt = runtime();
        let mut mpc = MpcController::new(small_config()).unwrap();
        let obs = observation(ca, t, tc, cref);

        rt.block_on(async {
            for _ in 0..warmup {
                act(&mut mpc, &obs, Action::ZERO).await?;
            }
            if let Some(action) = act(&mut mpc, &obs, Action::ZERO).await? {
                let new_tc = tc + action.value();
                prop_assert!(action.value().abs() <= 10.0 + 1e-9, "move {}", action.value());
                prop_assert!((273.0 - 1e-9..=322.0 + 1e-9).contains(&new_tc), "Tc {new_tc}");
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn unconstrained_optimum_is_still_clamped(
        tc in arb_coolant(),
        tick in arb_tick(),
        prior in arb_prior(),
    ) {
        // No move penalty and a distant reference: the optimizer wants the
        // largest possible coolant change every tick.
        let config = MpcConfig {
            input_rate_weight: 0.0,
            ..small_config()
        };
        let rt = runtime();
        let mut mpc = MpcController::new(config).unwrap();
        let obs = observation(8.5698, 311.2612, tc, 2.0);

        rt.block_on(async {
            for _ in 0..(tick % 3) {
                act(&mut mpc, &obs, Action::ZERO).await?;
            }
            if let Some(action) = act(&mut mpc, &obs, Action::new(prior).unwrap()).await? {
                let (lo, hi) = reachable(tc, prior);
                let new_tc = tc + action.value();
                prop_assert!(
                    new_tc >= lo - 1e-9 && new_tc <= hi + 1e-9,
                    "Tc {new_tc} outside [{lo}, {hi}]"
                );
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[test]
fn risk_adapter_extends_sensor_space() {
    let mpc = MpcController::new(small_config()).unwrap();
    assert!(!mpc.requires_risk_channel());

    let wrapped = WithRiskChannel::new(mpc);
    assert!(wrapped.requires_risk_channel());
    assert!(wrapped
        .filtered_sensor_space()
        .contains(&SensorKey::ThermalRunawayPredict));
    assert_eq!(wrapped.name(), "mpc");
}
