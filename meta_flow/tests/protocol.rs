use meta_flow::{
    Disclosure, ProtocolError, ProtocolEvent, ProtocolRole, Role, RoleConfig, RoleState, SeFormat,
    StudyReader,
};
use std::time::Duration;

use mpc::{
    executor::MpcExecutor,
    gmw::{FakeBitDealer, GmwEngine, GmwMessage},
    transport::{mock_peer_transports, BincodeDuplex, TransportError},
    MpcError, Party,
};

type TestEnv = MpcExecutor<GmwEngine<FakeBitDealer, BincodeDuplex<GmwMessage>>>;

const HEADER: &str =
    "MarkerName Strand N Effect_allele Other_allele EAF Imputation Information_type Information BETA SE P MAC";

fn study(se: &[&str]) -> String {
    let mut text = format!("{HEADER}\n");
    for (i, se) in se.iter().enumerate() {
        text.push_str(&format!(
            "rs{} + {} A T 0.41 1 0 0.95 -0.02 {se} 0.3 55\n",
            1000 + i,
            5000 - i
        ));
    }
    text
}

fn environments(seed: u64) -> (TestEnv, TestEnv) {
    let (first, second) = mock_peer_transports::<GmwMessage>(1 << 20);
    (
        MpcExecutor::new(GmwEngine::new(FakeBitDealer::new(Party::First, seed), first)),
        MpcExecutor::new(GmwEngine::new(FakeBitDealer::new(Party::Second, seed), second)),
    )
}

async fn run_role(
    role: Role,
    config: RoleConfig,
    env: &mut TestEnv,
    text: &str,
) -> (Result<Option<f64>, ProtocolError>, Vec<ProtocolEvent>) {
    let mut protocol = ProtocolRole::new(role, config, Vec::new());
    let study = StudyReader::from_reader(text.as_bytes()).unwrap();
    let result = protocol.run(env, study).await;
    (result, protocol.events().clone())
}

async fn run_protocol(
    config: RoleConfig,
    generator_study: &str,
    evaluator_study: &str,
) -> (
    Result<Option<f64>, ProtocolError>,
    Result<Option<f64>, ProtocolError>,
) {
    let (mut first, mut second) = environments(17);
    let ((generator, _), (evaluator, _)) = futures::join!(
        run_role(Role::Generator, config, &mut first, generator_study),
        run_role(Role::Evaluator, config, &mut second, evaluator_study)
    );
    (generator, evaluator)
}

#[tokio::test]
async fn test_median_disclosed_to_generator() {
    let config = RoleConfig::default();
    let (generator, evaluator) = run_protocol(
        config,
        &study(&["0.01", "0.02", "0.03"]),
        &study(&["0", "0", "0"]),
    )
    .await;

    let median = generator.unwrap().unwrap();
    assert!((median - 0.02).abs() <= config.encoding.precision());
    assert_eq!(evaluator.unwrap(), None);
}

#[tokio::test]
async fn test_complementary_inputs() {
    // Each site holds the real values of a different subset of variants.
    let (generator, _) = run_protocol(
        RoleConfig::default(),
        &study(&["0.7", "0", "0.1", "0", "0.4"]),
        &study(&["0", "0.3", "0", "0.9", "0"]),
    )
    .await;

    let median = generator.unwrap().unwrap();
    assert!((median - 0.4).abs() <= RoleConfig::default().encoding.precision());
}

#[tokio::test]
async fn test_disclosure_to_both() {
    let config = RoleConfig {
        disclosure: Disclosure::Both,
        ..Default::default()
    };
    let (generator, evaluator) = run_protocol(
        config,
        &study(&["0.5", "0.125", "0.25", "0.75"]),
        &study(&["0", "0", "0", "0"]),
    )
    .await;

    // Upper median of an even number of rows.
    assert_eq!(generator.unwrap(), Some(0.5));
    assert_eq!(evaluator.unwrap(), Some(0.5));
}

#[tokio::test]
async fn test_disclosure_to_evaluator() {
    let config = RoleConfig {
        disclosure: Disclosure::Evaluator,
        ..Default::default()
    };
    let (generator, evaluator) =
        run_protocol(config, &study(&["0", "0"]), &study(&["0.25", "0.5"])).await;

    assert_eq!(generator.unwrap(), None);
    assert_eq!(evaluator.unwrap(), Some(0.5));
}

#[tokio::test]
async fn test_xor_shared_inputs() {
    let config = RoleConfig {
        se_format: SeFormat::XorShare,
        ..Default::default()
    };
    let (generator, _) = run_protocol(
        config,
        &study(&["GFizBw==", "AAAAAA==", "AAAAAQ=="]),
        &study(&["nm2mBw==", "AAAAAA==", "AAAAAA=="]),
    )
    .await;

    // Rows combine to 0x00153586, 0 and 0x01000000.
    let expected = 0x0015_3586 as f64 / (1 << 24) as f64;
    assert_eq!(generator.unwrap(), Some(expected));
}

#[tokio::test]
async fn test_row_count_mismatch_is_configuration_error() {
    let (generator, evaluator) = run_protocol(
        RoleConfig::default(),
        &study(&["0.1", "0.2", "0.3"]),
        &study(&["0", "0"]),
    )
    .await;

    let generator = generator.unwrap_err();
    assert!(generator.is_configuration());
    assert!(evaluator.unwrap_err().is_configuration());
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let inputs = (study(&["0.3", "0.1", "0.2", "0.5"]), study(&["0"; 4]));
    let (first, _) = run_protocol(RoleConfig::default(), &inputs.0, &inputs.1).await;
    let (second, _) = run_protocol(RoleConfig::default(), &inputs.0, &inputs.1).await;
    assert_eq!(first.unwrap(), second.unwrap());
}

#[tokio::test]
async fn test_abort_when_peer_disconnects() {
    let (mut first, second) = environments(3);
    drop(second);

    let (result, events) = run_role(
        Role::Generator,
        RoleConfig::default(),
        &mut first,
        &study(&["0.1", "0.2"]),
    )
    .await;

    assert!(matches!(
        result,
        Err(ProtocolError::Abort {
            phase: RoleState::PreparingInput,
            ..
        })
    ));
    assert!(matches!(
        events.last(),
        Some(ProtocolEvent::StateChanged {
            to: RoleState::Aborted,
            ..
        })
    ));
}

#[tokio::test]
async fn test_abort_when_peer_stops_responding() {
    let (first, _silent_peer) = mock_peer_transports::<GmwMessage>(1 << 20);
    let limit = Duration::from_millis(100);
    let mut env = MpcExecutor::new(GmwEngine::new(
        FakeBitDealer::new(Party::First, 5),
        first.with_receive_timeout(limit),
    ));

    let (result, _) = run_role(
        Role::Generator,
        RoleConfig::default(),
        &mut env,
        &study(&["0.1", "0.2", "0.3"]),
    )
    .await;

    match result {
        Err(ProtocolError::Abort {
            phase: RoleState::PreparingInput,
            source: MpcError::Transport(TransportError::Timeout(Party::Second, waited)),
        }) => assert_eq!(waited, limit),
        other => panic!("unexpected result {other:?}"),
    }
}
