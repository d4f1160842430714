//! `livepanel demo`: a counter, a rolling list of readings and a reset button.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use livepanel_core::config::Config;
use livepanel_core::widgets::{Button, Text};
use livepanel_core::{EventKind, ObservableList};
use livepanel_session::Session;
use tracing::info;

const MAX_READINGS: usize = 10;

pub async fn run(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.get_or_insert_with(Default::default).port = port;
    }

    let session = Arc::new(Session::new(&config));
    session.window().set_title("Live Panel demo");

    let readings: ObservableList<u64> = ObservableList::empty(session.bus());
    let ticks = Arc::new(AtomicU64::new(0));

    session.add(Text::new("Readings refresh every second."));
    let counter_id = session.add_with_id(0u64, "ticks")?;
    session.add(readings.bold());

    let reset_readings = readings.clone();
    let reset_ticks = ticks.clone();
    session.add_with_id(
        Button::new("Reset").on_click(move |_| {
            reset_ticks.store(0, Ordering::SeqCst);
            reset_readings.clear();
        }),
        "reset",
    )?;

    let addr = tokio::task::spawn_blocking({
        let session = session.clone();
        move || session.run()
    })
    .await??;
    info!("Demo serving on ws://{addr}/ws");

    let ticker = tokio::spawn({
        let session = session.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                readings.push(n);
                if readings.len() > MAX_READINGS {
                    readings.remove(0);
                }
                session.update(&counter_id, n);
            }
        }
    });

    let events = tokio::task::spawn_blocking({
        let session = session.clone();
        move || loop {
            match session.wait_for_event(Duration::from_millis(250)) {
                Some(event) if event.kind == EventKind::Close => break,
                Some(event) => info!(target_id = %event.target, kind = ?event.kind, "Viewer event"),
                None if !session.is_running() => break,
                None => {}
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
        _ = events => info!("Viewer requested shutdown"),
    }

    ticker.abort();
    tokio::task::spawn_blocking(move || session.stop()).await?;
    Ok(())
}
