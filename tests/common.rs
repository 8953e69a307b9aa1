// tests/common.rs
#![allow(dead_code)]

use rinbox::message::dead_letter::DEFAULT_DEAD_LETTER_CAPACITY;
use rinbox::message::DeadLetterReceiver;
use rinbox::{
  dead_letters, Actor, InboxContext, InboxDirective, InboxError, InboxSettings, MemoryCluster, SystemMessage,
  UserMessage,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(150);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

static TRACING_INIT: Once = Once::new();

pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "rinbox=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// A context without a cluster, plus the dead-letter receiver.
pub fn local_context(settings: InboxSettings) -> (InboxContext, DeadLetterReceiver) {
  setup_tracing();
  let (dl_tx, dl_rx) = dead_letters(DEFAULT_DEAD_LETTER_CAPACITY);
  (InboxContext::new(settings, dl_tx), dl_rx)
}

/// A context backed by a fresh in-memory cluster.
pub fn cluster_context() -> (InboxContext, Arc<MemoryCluster>, DeadLetterReceiver) {
  let (ctx, dl_rx) = local_context(InboxSettings::default());
  let cluster = Arc::new(MemoryCluster::new());
  (ctx.with_cluster(cluster.clone()), cluster, dl_rx)
}

pub async fn recv_timeout<T>(rx: &async_channel::Receiver<T>, duration: Duration) -> Option<T> {
  timeout(duration, rx.recv()).await.ok().and_then(Result::ok)
}

/// Receives exactly `n` items or panics.
pub async fn collect_n<T>(rx: &async_channel::Receiver<T>, n: usize) -> Vec<T> {
  let mut out = Vec::with_capacity(n);
  for i in 0..n {
    match recv_timeout(rx, LONG_TIMEOUT).await {
      Some(item) => out.push(item),
      None => panic!("timed out waiting for item {} of {}", i + 1, n),
    }
  }
  out
}

/// Asserts that nothing arrives for `SHORT_TIMEOUT`.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &async_channel::Receiver<T>) {
  if let Some(item) = recv_timeout(rx, SHORT_TIMEOUT).await {
    panic!("unexpected item received: {:?}", item);
  }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + LONG_TIMEOUT;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  condition()
}

type Decide = Box<dyn Fn(u32, usize) -> Result<InboxDirective, InboxError> + Send + Sync>;

/// Records every delivery and answers with a scripted directive. The script
/// gets the value and how many times that value has been delivered so far.
pub struct ScriptedActor {
  seen: async_channel::Sender<u32>,
  system: async_channel::Sender<SystemMessage>,
  deliveries: Mutex<HashMap<u32, usize>>,
  decide: Decide,
  system_failure: Option<String>,
}

pub struct ActorRecord {
  pub seen: async_channel::Receiver<u32>,
  pub system: async_channel::Receiver<SystemMessage>,
}

impl ScriptedActor {
  pub fn new(
    decide: impl Fn(u32, usize) -> Result<InboxDirective, InboxError> + Send + Sync + 'static,
  ) -> (Arc<Self>, ActorRecord) {
    Self::build(Box::new(decide), None)
  }

  pub fn accepting() -> (Arc<Self>, ActorRecord) {
    Self::new(|_, _| Ok(InboxDirective::DEFAULT))
  }

  /// Accepts user messages but fails every system message with `reason`
  /// after recording it.
  pub fn failing_system(reason: &str) -> (Arc<Self>, ActorRecord) {
    Self::build(Box::new(|_, _| Ok(InboxDirective::DEFAULT)), Some(reason.to_string()))
  }

  fn build(decide: Decide, system_failure: Option<String>) -> (Arc<Self>, ActorRecord) {
    let (seen_tx, seen_rx) = async_channel::unbounded();
    let (sys_tx, sys_rx) = async_channel::unbounded();
    let actor = Arc::new(Self {
      seen: seen_tx,
      system: sys_tx,
      deliveries: Mutex::new(HashMap::new()),
      decide,
      system_failure,
    });
    (
      actor,
      ActorRecord {
        seen: seen_rx,
        system: sys_rx,
      },
    )
  }
}

#[async_trait]
impl Actor<u32> for ScriptedActor {
  async fn user_message(&self, msg: &UserMessage<u32>) -> Result<InboxDirective, InboxError> {
    let nth = {
      let mut deliveries = self.deliveries.lock().unwrap();
      let count = deliveries.entry(msg.content).or_insert(0);
      *count += 1;
      *count
    };
    let _ = self.seen.try_send(msg.content);
    (self.decide)(msg.content, nth)
  }

  async fn system_message(&self, msg: &SystemMessage) -> Result<(), InboxError> {
    let _ = self.system.try_send(msg.clone());
    match &self.system_failure {
      Some(reason) => Err(InboxError::handler(reason.clone())),
      None => Ok(()),
    }
  }
}
