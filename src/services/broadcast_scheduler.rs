use axum::extract::ws::{Message, Utf8Bytes};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::{dto::ws::ServerMessage, state::SharedState};

/// Push a full snapshot to every client whenever the counters changed since the last push.
///
/// Runs for the lifetime of the process.
pub async fn run(state: SharedState) {
    let period = state.config().broadcast_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_cycle(&state).await;
    }
}

/// One broadcast pass. Returns the number of clients reached, or `None` when
/// nothing changed since the previous broadcast.
pub async fn run_cycle(state: &SharedState) -> Option<usize> {
    let snapshot = state.counters().write().await.take_broadcast()?;

    let payload = match serde_json::to_string(&ServerMessage::from(snapshot)) {
        Ok(payload) => Utf8Bytes::from(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize seed update");
            return None;
        }
    };

    let mut delivered = 0;
    let mut closed = Vec::new();
    for client in state.clients().iter() {
        if client.tx.send(Message::Text(payload.clone())).is_ok() {
            delivered += 1;
        } else {
            closed.push(client.id);
        }
    }

    for client_id in closed {
        warn!(%client_id, "send failed (writer closed), removing client connection");
        state.clients().remove(&client_id);
    }

    info!(recipients = delivered, "sending out seed update to clients");
    Some(delivered)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, ClientConnection, counters::Side},
    };

    fn register(state: &SharedState) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.clients().insert(id, ClientConnection { id, tx });
        (id, rx)
    }

    #[tokio::test]
    async fn idle_cycle_sends_nothing() {
        let state = AppState::new(AppConfig::default());
        let (_, mut rx) = register(&state);

        assert_eq!(run_cycle(&state).await, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn one_broadcast_per_changed_cycle() {
        let state = AppState::new(AppConfig::default());
        let (_, mut first) = register(&state);
        let (_, mut second) = register(&state);

        {
            let mut counters = state.counters().write().await;
            counters.apply_delta(Side::Matt, 0, 1).unwrap();
            counters.apply_delta(Side::Matt, 0, 1).unwrap();
        }

        assert_eq!(run_cycle(&state).await, Some(2));
        assert_eq!(run_cycle(&state).await, None);

        for rx in [&mut first, &mut second] {
            let Message::Text(text) = rx.try_recv().unwrap() else {
                panic!("expected a text frame");
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["type"], "seedUpdate");
            assert_eq!(value["matt"][0], 2);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn closed_clients_are_dropped_from_registry() {
        let state = AppState::new(AppConfig::default());
        let (gone, rx) = register(&state);
        drop(rx);
        let (_, _live) = register(&state);

        state
            .counters()
            .write()
            .await
            .apply_delta(Side::Hail, 4, -1)
            .unwrap();

        assert_eq!(run_cycle(&state).await, Some(1));
        assert!(!state.clients().contains_key(&gone));
        assert_eq!(state.clients().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_loop_broadcasts_on_its_period() {
        let config = AppConfig::default().with_intervals(
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(1),
        );
        let state = AppState::new(config);
        let (_, mut rx) = register(&state);
        let task = tokio::spawn(run(state.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(rx.try_recv().is_err());

        state
            .counters()
            .write()
            .await
            .apply_delta(Side::Matt, 1, 3)
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());

        task.abort();
    }
}
