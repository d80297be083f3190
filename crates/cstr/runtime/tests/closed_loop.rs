//! Closed-loop episodes of every standard skill against the simulated plant.

use cstr_perceptor::{LogisticModel, PerceptorConfig, RiskPerceptor};
use cstr_runtime::{runner_from_config, ControlConfig, EpisodeTrace, RuntimeError};
use cstr_skills::mpc::ReferenceSchedule;

fn quick_mpc(mut config: ControlConfig) -> ControlConfig {
    config.mpc.horizon = 6;
    config.mpc.optimizer.max_iterations = 30;
    config.mpc.schedule = ReferenceSchedule {
        transition_start: 2,
        transition_end: 20,
        ..Default::default()
    };
    config
}

/// Every coolant stays within `max_rate` of the previous coolant plus the
/// previous action, clamped to the actuator range.
fn assert_actuator_limits(trace: &EpisodeTrace, initial_coolant: f64, max_rate: f64) {
    let mut previous = initial_coolant;
    let mut prior = 0.0;
    for record in &trace.records {
        let baseline = previous + prior;
        let lo = (baseline - max_rate).clamp(273.0, 322.0);
        let hi = (baseline + max_rate).clamp(273.0, 322.0);
        assert!(
            record.coolant >= lo - 1e-9 && record.coolant <= hi + 1e-9,
            "tick {} coolant {} outside [{lo}, {hi}]",
            record.tick,
            record.coolant
        );
        previous = record.coolant;
        prior = record.action;
    }
}

#[tokio::test]
async fn programmed_episode_follows_phases() {
    let config = ControlConfig::default();
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("programmed", 90).await.unwrap();

    assert_eq!(trace.records.len(), 90);
    assert!(trace.records[..22].iter().all(|r| r.action == 0.0));
    assert_eq!(trace.records[22].action, 1.0);
    assert_eq!(trace.records[74].action, 1.0);
    assert_eq!(trace.records[75].action, 2.0);
    assert!(trace.records.iter().all(|r| !r.governed));

    // Phase B alone pushes the coolant past its upper limit.
    assert_eq!(trace.records.last().unwrap().coolant, 322.0);
    assert_eq!(trace.report.episode.skill, "programmed");
    assert_eq!(trace.report.episode.ticks, 90);
}

#[tokio::test]
async fn rewards_start_at_zero_and_decay() {
    let config = ControlConfig::default();
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("programmed", 40).await.unwrap();

    assert_eq!(trace.records[0].reward, 0.0);
    for pair in trace.records[1..].windows(2) {
        assert!(pair[1].reward <= pair[0].reward);
        assert!(pair[1].reward > 0.0 && pair[1].reward <= 1.0);
    }
    assert_eq!(trace.report.summary.ticks_scored, 40);
    assert_eq!(trace.report.summary.final_reward, trace.records[39].reward);
}

#[tokio::test]
async fn error_threshold_corrects_during_transition() {
    let config = ControlConfig::default();
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("error-threshold", 60).await.unwrap();

    // The plant starts on its setpoint, so the skill holds first.
    assert_eq!(trace.records[0].action, 0.0);
    assert!(trace.records.iter().any(|r| r.action == 1.0));
    assert!(trace.records.iter().all(|r| r.action == 0.0 || r.action == 1.0));
}

#[tokio::test]
async fn pid_episode_stays_finite() {
    let config = ControlConfig::default();
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("pid", 60).await.unwrap();

    assert_eq!(trace.records[0].action, 0.0);
    for record in &trace.records {
        assert!(record.action.is_finite());
        assert!(record.temperature.is_finite());
        assert!((273.0..=322.0).contains(&record.coolant));
    }
}

#[tokio::test]
async fn mpc_episode_respects_actuator_limits() {
    let config = quick_mpc(ControlConfig::default());
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("mpc", 30).await.unwrap();

    assert_eq!(trace.records.len(), 30);
    assert_actuator_limits(
        &trace,
        config.simulation.initial_coolant,
        config.mpc.max_input_rate,
    );
    // Warmer coolant drives conversion toward the high-conversion target.
    let last = trace.records.last().unwrap();
    assert!(last.concentration < 8.0, "Ca stayed at {}", last.concentration);
}

#[tokio::test]
async fn temperature_mpc_tracks_setpoint_before_transition() {
    let config = ControlConfig::default();
    let mut runner = runner_from_config(&config, None).unwrap();
    let trace = runner.run("mpc-temperature", 30).await.unwrap();

    assert_eq!(trace.records.len(), 30);
    // Moves are rate limited against the controller's own coolant setting,
    // which starts at the model's operating point.
    let mut setting = config.mpc_temperature.initial_coolant;
    for record in &trace.records {
        assert!((273.0..=322.0).contains(&record.coolant));
        assert!(
            (record.coolant - setting).abs() <= 10.0 + 1e-9,
            "tick {} coolant {} from {}",
            record.tick,
            record.coolant,
            setting
        );
        setting = record.coolant;
    }
    for record in &trace.records[..22] {
        assert!(
            (record.temperature - 311.2612).abs() < 5.0,
            "tick {} T {}",
            record.tick,
            record.temperature
        );
    }
    // The ramp toward the hot operating point warms the coolant.
    assert!(trace.records[29].coolant > trace.records[21].coolant);
}

#[tokio::test]
async fn noisy_episodes_repeat_under_same_seed() {
    let mut config = ControlConfig::default();
    config.simulation.noise_fraction = 0.025;
    config.simulation.seed = 7;

    let mut first = runner_from_config(&config, None).unwrap();
    let mut second = runner_from_config(&config, None).unwrap();
    let a = first.run("error-threshold", 30).await.unwrap();
    let b = second.run("error-threshold", 30).await.unwrap();
    assert_eq!(a.records, b.records);

    // Rerunning the same runner reseeds the noise.
    let again = first.run("error-threshold", 30).await.unwrap();
    assert_eq!(a.records, again.records);
}

#[tokio::test]
async fn risk_coupled_mpc_is_attenuated() {
    // Gate below the initial temperature and a classifier that always fires.
    let perceptor = RiskPerceptor::new(
        Box::new(LogisticModel::new([0.0; 4], 10.0)),
        PerceptorConfig {
            temperature_threshold: 300.0,
            ..Default::default()
        },
    );
    let config = quick_mpc(ControlConfig::default());
    let mut runner = runner_from_config(&config, Some(perceptor)).unwrap();
    let trace = runner.run("mpc", 12).await.unwrap();

    for record in &trace.records {
        assert_eq!(record.runaway_predicted, Some(true));
        if record.proposed != 0.0 {
            assert!(record.governed);
            assert!((record.action - 0.95 * record.proposed).abs() < 1e-9);
        }
    }
    assert!(runner.selector().perceptor().unwrap().invocations() >= 12);
}

#[tokio::test]
async fn unknown_skill_is_rejected() {
    let mut runner = runner_from_config(&ControlConfig::default(), None).unwrap();
    let err = runner.run("bang-bang", 5).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownSkill(name) if name == "bang-bang"));
}
