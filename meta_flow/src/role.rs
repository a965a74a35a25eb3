use std::{fmt, io::BufRead, str::FromStr};

use mpc::{Party, SecureEnvironment};
use tracing::debug;

use crate::{
    oblivious_median, EncodedValue, EventSink, FixedPoint, ProtocolError, ProtocolEvent,
    SeFormat, StudyReader, VariantRecord,
};

/// Participant of the median protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Submits its standard errors as input of the first party.
    Generator,
    /// Submits its standard errors as input of the second party.
    Evaluator,
}

impl Role {
    pub fn party(self) -> Party {
        match self {
            Role::Generator => Party::First,
            Role::Evaluator => Party::Second,
        }
    }

    /// Whether the median is disclosed to this role.
    pub fn receives_output(self, disclosure: Disclosure) -> bool {
        matches!(
            (self, disclosure),
            (_, Disclosure::Both)
                | (Role::Generator, Disclosure::Generator)
                | (Role::Evaluator, Disclosure::Evaluator)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Generator => write!(f, "generator"),
            Role::Evaluator => write!(f, "evaluator"),
        }
    }
}

/// Roles that learn the computed median.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Disclosure {
    #[default]
    Generator,
    Evaluator,
    Both,
}

impl FromStr for Disclosure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generator" => Ok(Disclosure::Generator),
            "evaluator" => Ok(Disclosure::Evaluator),
            "both" => Ok(Disclosure::Both),
            _ => Err(format!(
                "Unsupported disclosure '{s}'. Available options: generator, evaluator, both"
            )),
        }
    }
}

/// Lifecycle of a protocol run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RoleState {
    Idle,
    PreparingInput,
    Computing,
    DisclosingOutput,
    Done,
    Aborted,
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleState::Idle => "idle",
            RoleState::PreparingInput => "preparing input",
            RoleState::Computing => "computing",
            RoleState::DisclosingOutput => "disclosing output",
            RoleState::Done => "done",
            RoleState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Parameters both parties must agree on out of band.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleConfig {
    pub encoding: FixedPoint,
    pub se_format: SeFormat,
    pub disclosure: Disclosure,
}

/// Encoded standard errors of one study.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedInput {
    /// One row per variant, bits least significant first.
    pub rows: Vec<Vec<bool>>,
    pub skipped_rows: usize,
    /// Largest sample size in the study.
    pub max_n: f64,
}

/// State machine driving one participant through a run of the median protocol.
pub struct ProtocolRole<S> {
    role: Role,
    config: RoleConfig,
    state: RoleState,
    events: S,
}

impl<S: EventSink> ProtocolRole<S> {
    pub fn new(role: Role, config: RoleConfig, events: S) -> Self {
        Self {
            role,
            config,
            state: RoleState::Idle,
            events,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> RoleState {
        self.state
    }

    pub fn events(&self) -> &S {
        &self.events
    }

    /// Run the protocol from `Idle` to `Done`.
    ///
    /// Returns the median if it is disclosed to this role. On failure the role is left in
    /// `Aborted` and nothing is disclosed; call [`reset`](Self::reset) and start over with
    /// freshly prepared input.
    pub async fn run<Env, R>(
        &mut self,
        env: &mut Env,
        study: StudyReader<R>,
    ) -> Result<Option<f64>, ProtocolError>
    where
        Env: SecureEnvironment,
        R: BufRead,
    {
        if self.state != RoleState::Idle {
            return Err(ProtocolError::InvalidState(self.state));
        }

        match self.execute(env, study).await {
            Ok(median) => {
                self.transition(RoleState::Done);
                Ok(median)
            }
            Err(err) => {
                self.events.emit(ProtocolEvent::Aborted {
                    role: self.role,
                    state: self.state,
                    reason: err.to_string(),
                });
                self.transition(RoleState::Aborted);
                Err(err)
            }
        }
    }

    /// Return to `Idle` after a finished or aborted run.
    pub fn reset(&mut self) {
        if self.state != RoleState::Idle {
            self.transition(RoleState::Idle);
        }
    }

    async fn execute<Env, R>(
        &mut self,
        env: &mut Env,
        study: StudyReader<R>,
    ) -> Result<Option<f64>, ProtocolError>
    where
        Env: SecureEnvironment,
        R: BufRead,
    {
        self.transition(RoleState::PreparingInput);
        let input = self.prepare_input(study)?;
        self.events.emit(ProtocolEvent::InputPrepared {
            role: self.role,
            rows: input.rows.len(),
            skipped_rows: input.skipped_rows,
            max_n: input.max_n,
        });

        // The other party's slot is filled with zeros of the same shape.
        let filler = vec![vec![false; self.config.encoding.bit_width()]; input.rows.len()];
        let (own_first, own_second) = match self.role {
            Role::Generator => (&input.rows, &filler),
            Role::Evaluator => (&filler, &input.rows),
        };
        let abort = |err| ProtocolError::from_mpc(RoleState::PreparingInput, err);
        let first = env.share_as_first_party(own_first).await.map_err(abort)?;
        let second = env.share_as_second_party(own_second).await.map_err(abort)?;

        self.transition(RoleState::Computing);
        let median = oblivious_median(env, first, second).await?;
        self.events.emit(ProtocolEvent::ComputationFinished {
            role: self.role,
            rows: input.rows.len(),
        });

        self.transition(RoleState::DisclosingOutput);
        let disclosure = self.config.disclosure;
        let abort = |err| ProtocolError::from_mpc(RoleState::DisclosingOutput, err);
        let mut bits = None;
        if Role::Generator.receives_output(disclosure) {
            bits = bits.or(env.reveal_to_first_party(&median).await.map_err(abort)?);
        }
        if Role::Evaluator.receives_output(disclosure) {
            bits = bits.or(env.reveal_to_second_party(&median).await.map_err(abort)?);
        }

        match bits {
            Some(bits) => {
                let median = self.config.encoding.decode(&EncodedValue::from_bits(&bits)?);
                self.events.emit(ProtocolEvent::MedianDisclosed {
                    role: self.role,
                    median,
                });
                Ok(Some(median))
            }
            None => Ok(None),
        }
    }

    /// Read all well-formed rows of the study and encode their standard errors.
    pub fn prepare_input<R: BufRead>(
        &self,
        mut study: StudyReader<R>,
    ) -> Result<PreparedInput, ProtocolError> {
        let mut rows = Vec::new();
        let mut max_n = 0.0f64;
        while let Some(record) = study.next_record()? {
            max_n = max_n.max(record.n()?);
            rows.push(self.encode_se(&record)?.to_bits());
        }

        if rows.is_empty() {
            return Err(ProtocolError::EmptyDataset);
        }
        debug!(role = %self.role, rows = rows.len(), "Standard errors encoded");

        Ok(PreparedInput {
            rows,
            skipped_rows: study.skipped_rows(),
            max_n,
        })
    }

    fn encode_se(&self, record: &VariantRecord) -> Result<EncodedValue, ProtocolError> {
        let encoding = &self.config.encoding;
        match self.config.se_format {
            SeFormat::Decimal => Ok(encoding.encode(record.se()?)?),
            SeFormat::XorShare => {
                let share = SeFormat::parse_share(record.se_field())?;
                Ok(EncodedValue::from_raw(share as u64, encoding.bit_width())?)
            }
        }
    }

    fn transition(&mut self, to: RoleState) {
        let from = std::mem::replace(&mut self.state, to);
        self.events.emit(ProtocolEvent::StateChanged {
            role: self.role,
            from,
            to,
        });
    }
}

#[cfg(test)]
mod tests {
    use mpc::{executor::MpcExecutor, plaintext::PlainMpcEngine};

    use super::*;

    const HEADER: &str =
        "MarkerName Strand N Effect_allele Other_allele EAF Imputation Information_type Information BETA SE P MAC";

    fn study(se: &[&str]) -> String {
        let mut text = format!("{HEADER}\n");
        for (i, se) in se.iter().enumerate() {
            text.push_str(&format!(
                "rs{i} + {} A G 0.3 1 0 0.9 0.1 {se} 0.05 10\n",
                900 + 10 * i
            ));
        }
        text
    }

    fn reader(text: &str) -> StudyReader<&[u8]> {
        StudyReader::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_disclosure() {
        assert!(Role::Generator.receives_output(Disclosure::Generator));
        assert!(!Role::Evaluator.receives_output(Disclosure::Generator));
        assert!(Role::Evaluator.receives_output(Disclosure::Evaluator));
        assert!(Role::Generator.receives_output(Disclosure::Both));
        assert!(Role::Evaluator.receives_output(Disclosure::Both));
        assert_eq!("both".parse::<Disclosure>(), Ok(Disclosure::Both));
        assert!("nobody".parse::<Disclosure>().is_err());
    }

    #[test]
    fn test_prepare_input() {
        let role = ProtocolRole::new(Role::Evaluator, RoleConfig::default(), Vec::new());
        let text = study(&["0.5", "0.25"]);
        let input = role.prepare_input(reader(&text)).unwrap();

        assert_eq!(input.rows.len(), 2);
        assert_eq!(input.rows[0].len(), 32);
        assert_eq!(EncodedValue::from_bits(&input.rows[1]).unwrap().raw(), 1 << 22);
        assert_eq!(input.max_n, 910.0);
        assert_eq!(input.skipped_rows, 0);
    }

    #[test]
    fn test_prepare_input_from_shares() {
        let config = RoleConfig {
            se_format: SeFormat::XorShare,
            ..Default::default()
        };
        let role = ProtocolRole::new(Role::Generator, config, Vec::new());
        let text = study(&["GFizBw=="]);
        let input = role.prepare_input(reader(&text)).unwrap();
        assert_eq!(
            EncodedValue::from_bits(&input.rows[0]).unwrap().raw(),
            0x07b3_5818
        );
    }

    #[test]
    fn test_prepare_input_rejects_negative_se() {
        let role = ProtocolRole::new(Role::Generator, RoleConfig::default(), Vec::new());
        let result = role.prepare_input(reader(&study(&["0.1", "-0.2"])));
        assert!(matches!(result, Err(ProtocolError::Range(_))));
    }

    #[test]
    fn test_prepare_input_rejects_empty_study() {
        let role = ProtocolRole::new(Role::Generator, RoleConfig::default(), Vec::new());
        let result = role.prepare_input(reader(&study(&[])));
        assert!(matches!(result, Err(ProtocolError::EmptyDataset)));
    }

    #[tokio::test]
    async fn test_run_emits_events() {
        let mut env = MpcExecutor::new(PlainMpcEngine::new(Party::First));
        let mut role = ProtocolRole::new(Role::Generator, RoleConfig::default(), Vec::new());
        let text = study(&["0.03", "0.01", "0.02"]);

        let median = role.run(&mut env, reader(&text)).await.unwrap().unwrap();
        assert!((median - 0.02).abs() <= RoleConfig::default().encoding.precision());
        assert_eq!(role.state(), RoleState::Done);

        let states: Vec<_> = role
            .events()
            .iter()
            .filter_map(|event| match event {
                ProtocolEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                RoleState::PreparingInput,
                RoleState::Computing,
                RoleState::DisclosingOutput,
                RoleState::Done
            ]
        );
        assert!(role.events().contains(&ProtocolEvent::InputPrepared {
            role: Role::Generator,
            rows: 3,
            skipped_rows: 0,
            max_n: 920.0,
        }));
    }

    #[tokio::test]
    async fn test_run_requires_idle_state() {
        let mut env = MpcExecutor::new(PlainMpcEngine::new(Party::First));
        let mut role = ProtocolRole::new(Role::Generator, RoleConfig::default(), Vec::new());
        let text = study(&["0.01"]);

        role.run(&mut env, reader(&text)).await.unwrap();
        let again = role.run(&mut env, reader(&text)).await;
        assert!(matches!(
            again,
            Err(ProtocolError::InvalidState(RoleState::Done))
        ));

        role.reset();
        assert_eq!(role.state(), RoleState::Idle);
        assert!(role.run(&mut env, reader(&text)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_run_discloses_nothing() {
        let mut env = MpcExecutor::new(PlainMpcEngine::new(Party::First));
        let mut events = Vec::new();
        let mut role = ProtocolRole::new(Role::Generator, RoleConfig::default(), &mut events);

        let result = role.run(&mut env, reader(&study(&["0.01", "NA"]))).await;
        assert!(matches!(result, Err(ProtocolError::Study(_))));
        assert_eq!(role.state(), RoleState::Aborted);

        assert!(events.iter().any(|event| matches!(
            event,
            ProtocolEvent::Aborted {
                state: RoleState::PreparingInput,
                ..
            }
        )));
        assert!(!events
            .iter()
            .any(|event| matches!(event, ProtocolEvent::MedianDisclosed { .. })));
    }
}
