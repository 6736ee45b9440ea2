//! One-way status stream from a worker to whatever surface displays it.
//!
//! The worker never blocks: when the bounded channel is full or its
//! receiver is gone, the message is appended to a fallback file (or logged
//! when no file is configured). Completion travels on a separate oneshot
//! channel so it cannot be dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::Sender<String>,
    fallback: Option<Arc<Mutex<File>>>,
    diverted: Arc<AtomicUsize>,
}

impl StatusSender {
    /// Queue `message` without waiting.
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message))
            | Err(mpsc::error::TrySendError::Closed(message)) => self.divert(&message),
        }
    }

    /// Messages that went to the fallback sink instead of the channel.
    pub fn diverted(&self) -> usize {
        self.diverted.load(Ordering::Relaxed)
    }

    fn divert(&self, message: &str) {
        self.diverted.fetch_add(1, Ordering::Relaxed);
        let Some(file) = &self.fallback else {
            tracing::warn!(event = "status_diverted", message = %message);
            return;
        };
        let written = match file.lock() {
            Ok(mut guard) => writeln!(guard, "{message}").is_ok(),
            Err(_) => false,
        };
        if !written {
            tracing::warn!(event = "status_diverted", message = %message);
        }
    }
}

/// Create a bounded status channel. `fallback` is opened for appending.
pub fn status_channel(
    capacity: usize,
    fallback: Option<&Path>,
) -> std::io::Result<(StatusSender, mpsc::Receiver<String>)> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let fallback = match fallback {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(Mutex::new(file)))
        }
        None => None,
    };
    Ok((
        StatusSender {
            tx,
            fallback,
            diverted: Arc::new(AtomicUsize::new(0)),
        },
        rx,
    ))
}

/// Terminal signal sent once when the worker finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Done {
    pub ok: bool,
    pub summary: String,
}

pub fn done_channel() -> (oneshot::Sender<Done>, oneshot::Receiver<Done>) {
    oneshot::channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_channel_diverts_to_fallback_file() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("status.log");
        let (sender, mut rx) = status_channel(1, Some(&fallback)).unwrap();

        sender.send("first");
        sender.send("second");
        sender.send("third");

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(sender.diverted(), 2);
        let written = std::fs::read_to_string(&fallback).unwrap();
        assert_eq!(written, "second\nthird\n");
    }

    #[tokio::test]
    async fn closed_receiver_never_blocks() {
        let (sender, rx) = status_channel(4, None).unwrap();
        drop(rx);
        sender.send("nobody listening");
        assert_eq!(sender.diverted(), 1);

        let (done_tx, done_rx) = done_channel();
        done_tx
            .send(Done {
                ok: true,
                summary: "finished".to_string(),
            })
            .unwrap();
        assert!(done_rx.await.unwrap().ok);
    }
}
