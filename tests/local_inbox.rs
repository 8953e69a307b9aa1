// tests/local_inbox.rs

use rinbox::{
  Inbox, InboundMessage, InboxDirective, InboxError, InboxSettings, LocalInbox, ProcessId, SystemMessage,
  UserControlMessage, UserMessage,
};
use tokio::time::timeout;
mod common;

use common::{assert_quiet, collect_n, local_context, recv_timeout, wait_until, ScriptedActor, LONG_TIMEOUT};

fn worker() -> ProcessId {
  ProcessId::new("/root/user/local-worker")
}

#[tokio::test]
async fn test_user_messages_in_order() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  for i in 0..100u32 {
    inbox.tell_user(UserMessage::tell(i))?;
  }
  assert_eq!(collect_n(&record.seen, 100).await, (0..100).collect::<Vec<_>>());
  assert_eq!(inbox.count(), 0);

  inbox.shutdown().await;
  timeout(LONG_TIMEOUT, inbox.join()).await?;
  Ok(())
}

#[tokio::test]
async fn test_configured_capacity_applies() {
  let settings = InboxSettings::default().with_process_mailbox_size(worker(), 3);
  let (ctx, _dl_rx) = local_context(settings);
  let (actor, _record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.pause().await.unwrap();
  for i in 0..3u32 {
    inbox.tell_user(UserMessage::tell(i)).unwrap();
  }
  let result = inbox.tell_user(UserMessage::tell(3));
  assert!(matches!(result, Err(InboxError::CapacityExceeded { capacity: 3 })));
  assert_eq!(inbox.count(), 3);

  inbox.shutdown().await;
}

#[tokio::test]
async fn test_failed_ask_reaches_reply_sink() -> anyhow::Result<()> {
  let (ctx, dl_rx) = local_context(InboxSettings::default());
  let (reply_tx, reply_rx) = async_channel::unbounded();
  let ctx = ctx.with_reply_sink(reply_tx);
  let (actor, record) = ScriptedActor::new(|v, _| {
    if v == 13 {
      Err(InboxError::handler("unlucky number"))
    } else {
      Ok(InboxDirective::DEFAULT)
    }
  });
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  let client = ProcessId::new("/root/user/client");
  inbox.tell_user(UserMessage::ask(13, 7, client.clone()).with_session("s-1"))?;
  inbox.tell_user(UserMessage::tell(14))?;

  assert_eq!(collect_n(&record.seen, 2).await, vec![13, 14]);

  let reply = recv_timeout(&reply_rx, LONG_TIMEOUT).await.expect("error reply");
  assert_eq!(reply.request_id, 7);
  assert_eq!(reply.session_id.as_deref(), Some("s-1"));
  assert_eq!(reply.to, client);
  assert_eq!(reply.from, worker());
  assert_quiet(&reply_rx).await;

  let letter = recv_timeout(&dl_rx, LONG_TIMEOUT).await.expect("dead letter");
  assert_eq!(letter.sender, Some(client));
  assert!(letter.error.as_deref().unwrap_or_default().contains("unlucky number"));

  inbox.shutdown().await;
  Ok(())
}

#[tokio::test]
async fn test_failed_tell_is_dead_lettered_without_reply() -> anyhow::Result<()> {
  let (ctx, dl_rx) = local_context(InboxSettings::default());
  let (reply_tx, reply_rx) = async_channel::unbounded();
  let ctx = ctx.with_reply_sink(reply_tx);
  let (actor, record) = ScriptedActor::new(|_, _| panic!("actor bug"));
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.tell_user(UserMessage::tell(1))?;
  inbox.tell_user(UserMessage::tell(2))?;
  assert_eq!(collect_n(&record.seen, 2).await, vec![1, 2]);

  let letters = collect_n(&dl_rx, 2).await;
  assert!(letters.iter().all(|l| l.recipient == worker()));
  assert_quiet(&reply_rx).await;

  inbox.shutdown().await;
  Ok(())
}

#[tokio::test]
async fn test_system_pause_and_unpause() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.tell_system(SystemMessage::Pause)?;
  assert!(wait_until(|| inbox.is_paused()).await);

  inbox.tell_user(UserMessage::tell(1))?;
  assert_quiet(&record.seen).await;
  assert_eq!(inbox.count(), 1);

  inbox.tell(InboundMessage::System(SystemMessage::Unpause))?;
  assert_eq!(collect_n(&record.seen, 1).await, vec![1]);
  assert_quiet(&record.system).await;

  inbox.shutdown().await;
  Ok(())
}

#[tokio::test]
async fn test_system_messages_bypass_paused_user_mailbox() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.pause().await?;
  inbox.tell_system(SystemMessage::Restart)?;
  assert_eq!(collect_n(&record.system, 1).await, vec![SystemMessage::Restart]);

  inbox.shutdown().await;
  Ok(())
}

#[tokio::test]
async fn test_user_control_messages_share_the_user_queue() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.tell_user(UserMessage::tell(1))?;
  inbox.tell(InboundMessage::UserControl(UserControlMessage::Ping))?;
  inbox.tell_user(UserMessage::tell(2))?;
  assert_eq!(collect_n(&record.seen, 2).await, vec![1, 2]);

  inbox.shutdown().await;
  Ok(())
}

#[tokio::test]
async fn test_shutdown_process_stops_both_consumers() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor, ctx, None);

  inbox.tell_user(UserMessage::tell(1))?;
  assert_eq!(collect_n(&record.seen, 1).await, vec![1]);

  inbox.tell_system(SystemMessage::ShutdownProcess)?;
  timeout(LONG_TIMEOUT, inbox.join()).await?;
  assert_eq!(collect_n(&record.system, 1).await, vec![SystemMessage::ShutdownProcess]);

  // Accepted but never delivered.
  inbox.tell_user(UserMessage::tell(2))?;
  assert_quiet(&record.seen).await;
  Ok(())
}

#[tokio::test]
async fn test_dropping_inbox_releases_actor() -> anyhow::Result<()> {
  let (ctx, _dl_rx) = local_context(InboxSettings::default());
  let (actor, record) = ScriptedActor::accepting();
  let inbox = LocalInbox::<_, u32>::startup(worker(), actor.clone(), ctx, None);

  inbox.tell_user(UserMessage::tell(1))?;
  assert_eq!(collect_n(&record.seen, 1).await, vec![1]);
  assert!(std::sync::Arc::strong_count(&actor) > 1);

  drop(inbox);
  assert!(wait_until(|| std::sync::Arc::strong_count(&actor) == 1).await);
  Ok(())
}
