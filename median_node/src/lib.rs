use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::ExitCode,
    time::Instant,
};

use argh::FromArgs;
use meta_flow::{
    encoding::{DEFAULT_BIT_WIDTH, DEFAULT_SCALE},
    Disclosure, EncodingError, FixedPoint, ProtocolError, ProtocolRole, Role, RoleConfig,
    SeFormat, StudyReader, TracingSink,
};
use mpc::{
    executor::MpcExecutor,
    gmw::{BitDealer, FakeBitDealer, GmwEngine, GmwMessage, PrecomputedBitDealer},
    transport::{connect_peer, NetChannel, NetworkConfig, PeerTransport},
    Party,
};
use thiserror::Error;
use tracing::{error, info, metadata::LevelFilter, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable with log filter directives.
pub const LOG_ENV_VAR: &str = "MEDIAN_LOG";

/// Party of the secure median standard error protocol.
#[derive(FromArgs, Debug)]
pub struct Options {
    /// path to study file
    #[argh(positional)]
    pub study: PathBuf,

    /// path to network configuration file (default: both parties on localhost)
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// path to precomputed AND triples produced by the dealer
    #[argh(option)]
    pub precomp: Option<PathBuf>,

    /// seed shared by both parties to derive AND triples without --precomp (insecure, for testing)
    #[argh(option)]
    pub insecure_seed: Option<u64>,

    /// number of fractional bits of encoded standard errors
    #[argh(option, default = "DEFAULT_SCALE")]
    pub scale: u32,

    /// format of the SE column: decimal or xor-share
    #[argh(option, default = "SeFormat::Decimal")]
    pub se_format: SeFormat,

    /// who learns the median: generator, evaluator or both
    #[argh(option, default = "Disclosure::Generator")]
    pub disclosure: Disclosure,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid network configuration: {0}")]
    Config(#[source] io::Error),

    #[error("invalid precomputed data: {0}")]
    Precomp(#[source] io::Error),

    #[error("precomputed data belongs to {0}")]
    PrecompParty(Party),

    #[error("no source of AND triples: pass --precomp, or --insecure-seed for testing")]
    MissingTriples,

    #[error("cannot connect to peer: {0}")]
    Connect(#[source] io::Error),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

enum TripleSource {
    Precomputed(PrecomputedBitDealer),
    InsecureSeed(u64),
}

/// Install log subscriber writing to stderr, filtered by `MEDIAN_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

/// Entry point shared by the party binaries.
pub async fn node_main(role: Role) -> ExitCode {
    init_tracing();
    let options: Options = argh::from_env();

    match run_party(role, &options).await {
        Ok(Some(median)) => {
            println!("Median standard error: {median}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%role, "{err}");
            ExitCode::FAILURE
        }
    }
}

/// Run one party of the protocol. Local inputs are validated before connecting to the peer.
pub async fn run_party(role: Role, options: &Options) -> Result<Option<f64>, NodeError> {
    let network = match &options.config {
        Some(path) => NetworkConfig::load(path).map_err(NodeError::Config)?,
        None => NetworkConfig::default(),
    };

    let config = RoleConfig {
        encoding: FixedPoint::new(DEFAULT_BIT_WIDTH, options.scale)?,
        se_format: options.se_format,
        disclosure: options.disclosure,
    };

    let study = StudyReader::open(&options.study).map_err(ProtocolError::from)?;

    let triples = match (&options.precomp, options.insecure_seed) {
        (Some(path), _) => {
            let dealer = PrecomputedBitDealer::from_file(path).map_err(NodeError::Precomp)?;
            if dealer.party() != role.party() {
                return Err(NodeError::PrecompParty(dealer.party()));
            }
            TripleSource::Precomputed(dealer)
        }
        (None, Some(seed)) => TripleSource::InsecureSeed(seed),
        (None, None) => return Err(NodeError::MissingTriples),
    };

    info!(%role, study = %options.study.display(), "Waiting for peer");
    let transport = connect_peer::<GmwMessage>(&network, role.party())
        .await
        .map_err(NodeError::Connect)?;
    info!(%role, "Peer connected, computing median standard error");

    match triples {
        TripleSource::Precomputed(dealer) => {
            info!(triples = dealer.remaining_triples(), "Using precomputed AND triples");
            run_with_dealer(role, config, dealer, transport, study).await
        }
        TripleSource::InsecureSeed(seed) => {
            warn!("AND triples are derived from a shared seed, inputs are not protected");
            let dealer = FakeBitDealer::new(role.party(), seed);
            run_with_dealer(role, config, dealer, transport, study).await
        }
    }
}

async fn run_with_dealer<D: BitDealer>(
    role: Role,
    config: RoleConfig,
    dealer: D,
    transport: PeerTransport<GmwMessage, NetChannel<GmwMessage>>,
    study: StudyReader<BufReader<File>>,
) -> Result<Option<f64>, NodeError> {
    let mut env = MpcExecutor::new(GmwEngine::new(dealer, transport));
    let mut protocol = ProtocolRole::new(role, config, TracingSink);

    let start_time = Instant::now();
    let median = protocol.run(&mut env, study).await?;

    let stats = env.stats();
    info!(
        and_gates = stats.num_and_gates,
        rounds = stats.num_rounds,
        seconds = start_time.elapsed().as_secs_f64(),
        "Protocol finished"
    );
    Ok(median)
}
