//! Terminal presenter for controller events.

use std::io::Write;
use tokio::{sync::mpsc, time::Instant};
use tracing::warn;
use voxlink_core::{
    view::{Controls, NOTICE_DURATION, Notice, NoticeKind, UiEvent},
    voice::Mode,
};

/// Active notices, each dismissed `NOTICE_DURATION` after it was shown.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    entries: Vec<(Instant, Notice)>,
}

impl NoticeBoard {
    pub fn push(&mut self, notice: Notice, now: Instant) {
        self.entries.push((now + NOTICE_DURATION, notice));
    }

    /// Removes and returns every notice whose display time has elapsed.
    pub fn expire(&mut self, now: Instant) -> Vec<Notice> {
        let (expired, active): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|(deadline, _)| *deadline <= now);
        self.entries = active;
        expired.into_iter().map(|(_, notice)| notice).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(deadline, _)| *deadline).min()
    }

    pub fn active(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter().map(|(_, notice)| notice)
    }
}

/// Renders [`UiEvent`]s as lines of text.
pub struct ConsolePresenter<W> {
    out: W,
    notices: NoticeBoard,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            notices: NoticeBoard::default(),
        }
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: UiEvent, now: Instant) {
        let line = match event {
            UiEvent::State(state) => format!("[status] {}", state),
            UiEvent::Speaking(Mode::Speaking) => "[agent] speaking".to_string(),
            UiEvent::Speaking(Mode::Listening) => "[agent] listening".to_string(),
            UiEvent::Controls(controls) => format!("[controls] {}", describe(controls)),
            UiEvent::Notice(notice) => {
                let line = format!("[{}] {}", label(notice.kind), notice.message);
                self.notices.push(notice, now);
                line
            }
            UiEvent::Turn(turn) => format!("{}: {}", turn.role, turn.content),
            UiEvent::Delay(Some(seconds)) => format!("[delay] agent replies in {}s", seconds),
            UiEvent::Delay(None) => "[delay] cleared".to_string(),
            UiEvent::AgentId(agent_id) => format!("[agent] id {}", agent_id),
        };
        self.write_line(&line);
    }

    pub fn dismiss_expired(&mut self, now: Instant) {
        for notice in self.notices.expire(now) {
            let line = format!("[dismissed] {}", notice.message);
            self.write_line(&line);
        }
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!(error = %e, "Failed to write to console.");
        }
    }

    /// Renders events until the controller drops its sender.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<UiEvent>) -> W {
        loop {
            let deadline = self.notices.next_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.render(event, Instant::now()),
                    None => break,
                },
                _ = sleep_until(deadline) => self.dismiss_expired(Instant::now()),
            }
        }
        self.out
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn label(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Success => "ok",
        NoticeKind::Info => "info",
        NoticeKind::Error => "error",
    }
}

fn describe(controls: Controls) -> &'static str {
    match (controls.start_enabled, controls.end_enabled) {
        (true, false) => "start available",
        (false, true) => "end available",
        (true, true) => "start or end available",
        (false, false) => "busy",
    }
}
