use std::sync::Arc;
use std::time::Duration;

use ivcap_config::EnvironmentConfig;
use ivcap_http::{Error, HttpClient, Request};
use ivcap_log::Logger;

/// Liveness path on the storage service.
pub const READY_PATH: &str = "readyz";

/// Pause between failed probes. Fixed, not exponential.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Deadline for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts a worker makes by default before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How a wait ended successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
  /// Local mode: nothing to wait for.
  Skipped,
  /// The liveness path answered on probe number `attempts`.
  Ready { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
  Probing(u32),
  Ready(u32),
  Exhausted(u32),
}

impl ProbeState {
  fn next(self, probe_ok: bool, max_attempts: u32) -> Self {
    match self {
      Self::Probing(n) if probe_ok => Self::Ready(n),
      Self::Probing(n) if n < max_attempts => Self::Probing(n + 1),
      Self::Probing(n) => Self::Exhausted(n),
      done => done,
    }
  }
}

/// Blocks worker startup until the storage sidecar is reachable.
#[derive(Clone)]
pub struct ReadinessGate {
  config: Arc<EnvironmentConfig>,
  client: Arc<dyn HttpClient>,
  logger: Arc<dyn Logger>,
  delay: Duration,
}

impl ReadinessGate {
  pub fn new(
    config: Arc<EnvironmentConfig>,
    client: Arc<dyn HttpClient>,
    logger: Arc<dyn Logger>,
  ) -> Self {
    Self {
      config,
      client,
      logger,
      delay: RETRY_DELAY,
    }
  }

  /// Replace the pause between failed probes.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Probe `<storage>/readyz` until it answers or `max_attempts` probes failed.
  ///
  /// Any response counts as ready; the status is not inspected. At most
  /// `max_attempts` probes are made (at least one), separated by the retry
  /// delay. Exhaustion yields [`Error::NotReady`]. In local mode this returns
  /// [`Readiness::Skipped`] without touching the network.
  pub async fn wait_until_ready(&self, max_attempts: u32) -> Result<Readiness, Error> {
    if self.config.local_mode {
      self
        .logger
        .debug(format_args!("local mode - skipping readiness check"));
      return Ok(Readiness::Skipped);
    }

    let max_attempts = max_attempts.max(1);
    let url = self.config.storage_endpoint(READY_PATH);
    let mut state = ProbeState::Probing(1);

    loop {
      match state {
        ProbeState::Probing(attempt) => {
          self
            .logger
            .debug(format_args!("checking 'ready' at '{}'", url));
          let ok = self.probe(&url).await;
          state = state.next(ok, max_attempts);

          if matches!(state, ProbeState::Probing(_)) {
            self.logger.debug(format_args!(
              "waiting for sidecars: attempt #{} delay: {} sec url: {}",
              attempt,
              self.delay.as_secs(),
              self.config.storage_url
            ));
            tokio::time::sleep(self.delay).await;
          }
        }
        ProbeState::Ready(attempts) => {
          self.logger.info(format_args!(
            "environment ready after {} attempt(s)",
            attempts
          ));
          return Ok(Readiness::Ready { attempts });
        }
        ProbeState::Exhausted(attempts) => {
          let err = Error::NotReady { attempts };
          self.logger.error(format_args!("{}", err));
          return Err(err);
        }
      }
    }
  }

  async fn probe(&self, url: &str) -> bool {
    let request = Request::get(url).timeout(PROBE_TIMEOUT);
    match self.client.send(request).await {
      Ok(_) => true,
      Err(e) => {
        self.logger.debug(format_args!("readiness probe failed - {}", e));
        false
      }
    }
  }
}
