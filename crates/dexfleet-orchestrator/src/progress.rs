//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Bring-up progress feed and live terminal table."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::io::Write;

use crossterm::cursor::MoveUp;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub service: String,
    pub status: String,
}

/// Broadcast of `{service, status}` updates. Slow consumers lose the oldest
/// entries; publishing never waits.
#[derive(Debug, Clone)]
pub struct ProgressFeed {
    tx: broadcast::Sender<ProgressUpdate>,
}

impl Default for ProgressFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, service: &str, status: impl Into<String>) {
        let _ = self.tx.send(ProgressUpdate {
            service: service.to_owned(),
            status: status.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }
}

/// Two-column table redrawn in place as updates arrive.
#[derive(Debug, Default)]
pub struct ProgressTable {
    rows: IndexMap<String, String>,
    drawn_lines: u16,
}

impl ProgressTable {
    pub fn new<'a>(services: impl IntoIterator<Item = &'a str>) -> Self {
        let rows = services
            .into_iter()
            .map(|name| (name.to_owned(), "Waiting...".to_owned()))
            .collect();
        Self {
            rows,
            drawn_lines: 0,
        }
    }

    /// Returns whether the update changed a row.
    pub fn apply(&mut self, update: ProgressUpdate) -> bool {
        match self.rows.get_mut(&update.service) {
            Some(status) if *status == update.status => false,
            Some(status) => {
                *status = update.status;
                true
            }
            None => {
                self.rows.insert(update.service, update.status);
                true
            }
        }
    }

    pub fn status(&self, service: &str) -> Option<&str> {
        self.rows.get(service).map(String::as_str)
    }

    /// Redraw the table, replacing the previous rendering.
    pub fn render<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        if self.drawn_lines > 0 {
            out.queue(MoveUp(self.drawn_lines))?;
            out.queue(Clear(ClearType::FromCursorDown))?;
        }
        let width = self
            .rows
            .keys()
            .map(String::len)
            .chain(std::iter::once("SERVICE".len()))
            .max()
            .unwrap_or_default();
        writeln!(out, "{:<width$}  STATUS", "SERVICE", width = width)?;
        for (service, status) in &self.rows {
            writeln!(out, "{:<width$}  {}", service, status, width = width)?;
        }
        out.flush()?;
        self.drawn_lines = u16::try_from(self.rows.len() + 1).unwrap_or(u16::MAX);
        Ok(())
    }
}

/// Render updates from `rx` to stdout until the feed closes or `stop` fires.
pub async fn render_live(
    mut table: ProgressTable,
    mut rx: broadcast::Receiver<ProgressUpdate>,
    stop: CancellationToken,
) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout);
    let _ = writeln!(stdout, "Syncing light clients:");
    if let Err(err) = table.render(&mut stdout) {
        debug!(error = %err, "progress table render failed");
        return;
    }
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            update = rx.recv() => match update {
                Ok(update) => {
                    if table.apply(update) {
                        if let Err(err) = table.render(&mut stdout) {
                            debug!(error = %err, "progress table render failed");
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress renderer lagged; dropping updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let feed = ProgressFeed::new(2);
        for i in 0..10 {
            feed.publish("lndbtc", format!("Syncing {}%", i));
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_loses_oldest() {
        let feed = ProgressFeed::new(2);
        let mut rx = feed.subscribe();
        feed.publish("lndbtc", "a");
        feed.publish("lndbtc", "b");
        feed.publish("lndbtc", "c");
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().status, "b");
        assert_eq!(rx.recv().await.unwrap().status, "c");
    }

    #[test]
    fn table_tracks_latest_status_per_service() {
        let mut table = ProgressTable::new(["lndbtc", "lndltc"]);
        assert!(table.apply(ProgressUpdate {
            service: "lndltc".into(),
            status: "Ready".into(),
        }));
        assert!(!table.apply(ProgressUpdate {
            service: "lndltc".into(),
            status: "Ready".into(),
        }));

        let mut out = Vec::new();
        table.render(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("SERVICE  STATUS"));
        assert!(text.contains("lndbtc   Waiting..."));
        assert!(text.contains("lndltc   Ready"));
        assert_eq!(table.status("lndltc"), Some("Ready"));
    }
}
