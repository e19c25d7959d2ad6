//! Feature detection
//!
//! Discovers, once per connection, which optional commands the server
//! supports. The first query pipelines `HELP`, `HELP SITE`, `FEAT` and a sync
//! marker; queries arriving before the sync marker fires are buffered and
//! resolved as soon as their command shows up in a reply, or with `false`
//! when detection finishes without it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::bell::Bell;
use crate::client::Channel;
use crate::error::ChannelError;
use crate::protocol::Reply;
use crate::utils::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unstarted,
    InProgress,
    Done,
}

struct FeatureState {
    phase: Phase,
    features: HashSet<String>,
    checks: Vec<(String, Bell<bool>)>,
    /// Set when the channel failed before detection finished.
    failure: Option<ChannelError>,
}

impl FeatureState {
    /// Removes and returns the buffered checks that are now known to be
    /// supported.
    fn take_supported(&mut self) -> Vec<Bell<bool>> {
        let (supported, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.checks)
            .into_iter()
            .partition(|(cmd, _)| self.features.contains(cmd));
        self.checks = waiting;
        supported.into_iter().map(|(_, bell)| bell).collect()
    }
}

/// The set of commands a server supports, built lazily on first query.
#[derive(Clone)]
pub struct FeatureSet {
    state: Arc<Mutex<FeatureState>>,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeatureState {
                phase: Phase::Unstarted,
                features: HashSet::new(),
                checks: Vec::new(),
                failure: None,
            })),
        }
    }

    /// Returns true once detection has finished and queries are answered
    /// from the cache.
    pub fn is_done(&self) -> bool {
        lock(&self.state).phase == Phase::Done
    }

    /// Checks whether `cmd` is supported, starting detection on `channel`
    /// the first time it is called. Commands are matched case-insensitively.
    pub fn supports(&self, channel: &Channel, cmd: &str) -> Bell<bool> {
        let cmd = normalize(cmd);
        let bell = Bell::new();

        let start = {
            let mut state = lock(&self.state);
            if let Some(err) = state.failure.clone() {
                drop(state);
                return Bell::ready(Err(err));
            }
            let phase = state.phase;
            match phase {
                Phase::Done => {
                    let supported = state.features.contains(&cmd);
                    drop(state);
                    bell.ring_ok(supported);
                    return bell;
                }
                Phase::InProgress => {
                    state.checks.push((cmd, bell.clone()));
                    false
                }
                Phase::Unstarted => {
                    state.phase = Phase::InProgress;
                    state.checks.push((cmd, bell.clone()));
                    true
                }
            }
        };

        // Issued without holding the lock: a fast server may answer before
        // the sync marker is queued, resolving it on this thread.
        if start {
            self.detect(channel);
        }
        bell
    }

    fn detect(&self, channel: &Channel) {
        debug!("Starting feature detection");

        let features = self.clone();
        channel.command_with("HELP", &[], move |_, reply| {
            features.parse(reply, parse_help, None);
            Ok(())
        });

        let features = self.clone();
        channel.command_with("HELP", &["SITE"], move |_, reply| {
            features.parse(reply, parse_help, Some("SITE"));
            Ok(())
        });

        let features = self.clone();
        channel.command_with("FEAT", &[], move |_, reply| {
            features.parse(reply, parse_feat, None);
            Ok(())
        });

        let features = self.clone();
        let marker = channel.sync_with(move |_| {
            features.finalize();
            Ok(())
        });

        // The marker's handler never runs if the channel fails first.
        let features = self.clone();
        marker.bell().on_ring(move |result| {
            if let Err(e) = result {
                features.fail(e.clone());
            }
        });
    }

    fn parse(&self, reply: &Reply, parser: fn(&Reply) -> Vec<String>, prefix: Option<&str>) {
        if !reply.is_complete() {
            return;
        }
        let ready = {
            let mut state = lock(&self.state);
            for token in parser(reply) {
                let token = match prefix {
                    Some(prefix) => format!("{} {}", prefix, token),
                    None => token,
                };
                state.features.insert(token);
            }
            state.take_supported()
        };
        for bell in ready {
            bell.ring_ok(true);
        }
    }

    fn finalize(&self) {
        let (ready, unsupported) = {
            let mut state = lock(&self.state);
            let ready = state.take_supported();
            let unsupported: Vec<_> = state.checks.drain(..).map(|(_, b)| b).collect();
            state.phase = Phase::Done;
            debug!("Feature detection done: {} feature(s)", state.features.len());
            (ready, unsupported)
        };
        for bell in ready {
            bell.ring_ok(true);
        }
        for bell in unsupported {
            bell.ring_ok(false);
        }
    }

    fn fail(&self, err: ChannelError) {
        let checks = {
            let mut state = lock(&self.state);
            debug!("Feature detection failed: {}", err);
            state.failure = Some(err.clone());
            std::mem::take(&mut state.checks)
        };
        for (_, bell) in checks {
            bell.ring_err(err.clone());
        }
    }
}

fn normalize(cmd: &str) -> String {
    cmd.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Interior lines of the reply, excluding the first and the last.
fn interior(reply: &Reply) -> Vec<String> {
    let lines = reply.lines();
    if lines.len() <= 2 {
        return Vec::new();
    }
    lines[1..lines.len() - 1].to_vec()
}

/// Commands listed in a HELP reply. Entries containing `*` mark
/// unimplemented commands and are skipped.
fn parse_help(reply: &Reply) -> Vec<String> {
    interior(reply)
        .iter()
        .flat_map(|line| line.split_whitespace().map(str::to_ascii_uppercase).collect::<Vec<_>>())
        .filter(|token| !token.contains('*'))
        .collect()
}

/// Features listed in a FEAT reply: the first word of each interior line.
fn parse_feat(reply: &Reply) -> Vec<String> {
    interior(reply)
        .iter()
        .filter_map(|line| line.split_whitespace().next().map(str::to_ascii_uppercase))
        .collect()
}
