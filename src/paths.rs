use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Environment variable that relocates all hookdrive state.
pub const HOME_ENV: &str = "HOOKDRIVE_HOME";

const HOME_DIR_NAME: &str = ".hookdrive";

/// Resolve the state root.
///
/// Prefers `$HOOKDRIVE_HOME` when set and non-empty, otherwise `$HOME/.hookdrive`.
pub fn resolve_home() -> Result<PathBuf> {
    if let Some(explicit) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(HOME_DIR_NAME)),
        None => bail!("neither {HOME_ENV} nor HOME is set; cannot locate hookdrive state"),
    }
}

/// Make a session name safe to embed in a file name.
///
/// `[A-Za-z0-9_-]` passes through; every other byte is percent-encoded, so
/// distinct session names never share a state file. The empty name becomes
/// a lone `%`, which no encoding produces.
pub fn session_file_stem(session: &str) -> String {
    if session.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(session.len());
    for byte in session.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Well-known locations below the state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join("agent-registry.json")
    }

    pub fn queues_dir(&self) -> PathBuf {
        self.root.join("queues")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    pub fn queue_file(&self, session: &str) -> PathBuf {
        self.queues_dir()
            .join(format!("queue-{}.json", session_file_stem(session)))
    }

    pub fn stale_queue_file(&self, session: &str) -> PathBuf {
        self.queues_dir()
            .join(format!("queue-{}.stale.json", session_file_stem(session)))
    }

    pub fn question_file(&self, session: &str) -> PathBuf {
        self.queues_dir()
            .join(format!("question-{}.json", session_file_stem(session)))
    }

    pub fn pending_answer_file(&self, session: &str) -> PathBuf {
        self.queues_dir()
            .join(format!("pending-answer-{}.json", session_file_stem(session)))
    }

    /// Per-session journal, or the shared one when there is no session.
    pub fn journal_file(&self, session: Option<&str>) -> PathBuf {
        match session {
            Some(session) => self
                .logs_dir()
                .join(format!("{}-events.jsonl", session_file_stem(session))),
            None => self.logs_dir().join("hookdrive.jsonl"),
        }
    }

    pub fn deferred_log_file(&self, session: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("deferred-{}.log", session_file_stem(session)))
    }

    /// Output of detached gateway deliveries.
    pub fn gateway_log_file(&self, session: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("gateway-{}.log", session_file_stem(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn session_stem_escapes_separators() {
        assert_eq!(session_file_stem("warden-main-4"), "warden-main-4");
        assert_eq!(session_file_stem("a/b.c"), "a%2Fb%2Ec");
        assert_eq!(session_file_stem("../etc"), "%2E%2E%2Fetc");
        assert_eq!(session_file_stem("é"), "%C3%A9");
        assert_eq!(session_file_stem(""), "%");
    }

    #[test]
    fn similar_session_names_get_distinct_files() {
        let layout = StateLayout::new("/state");
        let names = [
            "my session",
            "my-session",
            "my_session",
            "my%20session",
            "w1.stale",
            "w1",
        ];
        let mut files: Vec<PathBuf> = names.iter().map(|n| layout.queue_file(n)).collect();
        files.extend(names.iter().map(|n| layout.stale_queue_file(n)));
        let mut unique = files.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), files.len());

        assert_ne!(
            layout.journal_file(Some("hookdrive")),
            layout.journal_file(None)
        );
    }

    #[test]
    fn layout_places_session_files_under_queues() {
        let layout = StateLayout::new("/state");
        assert_eq!(
            layout.queue_file("w1"),
            PathBuf::from("/state/queues/queue-w1.json")
        );
        assert_eq!(
            layout.stale_queue_file("w1"),
            PathBuf::from("/state/queues/queue-w1.stale.json")
        );
        assert_eq!(
            layout.question_file("w1"),
            PathBuf::from("/state/queues/question-w1.json")
        );
        assert_eq!(
            layout.pending_answer_file("w1"),
            PathBuf::from("/state/queues/pending-answer-w1.json")
        );
    }

    #[test]
    fn journal_falls_back_to_shared_file() {
        let layout = StateLayout::new("/state");
        assert_eq!(
            layout.journal_file(None),
            PathBuf::from("/state/logs/hookdrive.jsonl")
        );
        assert_eq!(
            layout.journal_file(Some("w1")),
            PathBuf::from("/state/logs/w1-events.jsonl")
        );
    }

    #[test]
    #[serial]
    fn home_prefers_explicit_env() {
        let previous = std::env::var_os(HOME_ENV);
        unsafe { std::env::set_var(HOME_ENV, "/custom/state") };
        let resolved = resolve_home().unwrap();
        match previous {
            Some(v) => unsafe { std::env::set_var(HOME_ENV, v) },
            None => unsafe { std::env::remove_var(HOME_ENV) },
        }
        assert_eq!(resolved, PathBuf::from("/custom/state"));
    }

    #[test]
    #[serial]
    fn home_defaults_below_user_home() {
        let previous = std::env::var_os(HOME_ENV);
        unsafe { std::env::remove_var(HOME_ENV) };
        let resolved = resolve_home();
        if let Some(v) = previous {
            unsafe { std::env::set_var(HOME_ENV, v) };
        }
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(resolved.unwrap(), PathBuf::from(home).join(".hookdrive"));
        }
    }
}
