//! Mixer tasks hosted by the loopback service
//!
//! The host never composites anything; it tracks which inputs a task would
//! be mixing and whether its outputs are relaying:
//! - An input whose stream is missing is kept for the input grace window,
//!   then dropped from the mix. The task itself never fails for it.
//! - A stopped task without a successor keeps relaying until every input
//!   has been dropped.
//! - A task started with an output another task relays to succeeds that
//!   task, which ends at once.

use std::collections::BTreeMap;

use tokio::time::Instant;

use crate::dispatch::ExtendedData;
use crate::error::ErrorCode;
use crate::ids::{StreamId, TaskId};
use crate::mixer::MixerTask;
use crate::relay::{RelayCdnInfo, RelayCdnState, RelayCdnUpdateReason};
use crate::signaling::{Inbound, RequestId};

use super::server::{ClientId, Hub};

struct HostedTask {
    owner: ClientId,
    task: MixerTask,
    /// Inputs still in the mix, with the time each went missing
    inputs: BTreeMap<StreamId, Option<Instant>>,
    stopping: bool,
    relaying: bool,
}

impl HostedTask {
    fn targets(&self) -> Vec<String> {
        self.task.output_targets().map(str::to_string).collect()
    }
}

#[derive(Default)]
pub(super) struct MixerHost {
    tasks: BTreeMap<TaskId, HostedTask>,
}

impl MixerHost {
    pub(super) fn inputs(&self, task_id: &TaskId) -> Option<Vec<StreamId>> {
        self.tasks
            .get(task_id)
            .map(|hosted| hosted.inputs.keys().cloned().collect())
    }
}

impl Hub {
    fn relay_update(&mut self, owner: ClientId, task_id: &TaskId, targets: Vec<String>, state: RelayCdnState) {
        if targets.is_empty() {
            return;
        }
        let reason = match state {
            RelayCdnState::Stop => RelayCdnUpdateReason::Disconnected,
            _ => RelayCdnUpdateReason::None,
        };
        let infos: Vec<RelayCdnInfo> = targets
            .into_iter()
            .map(|url| RelayCdnInfo::new(url, state, reason, self.stamp()))
            .collect();
        self.deliver(
            owner,
            Inbound::MixerRelayCdnUpdate {
                task_id: task_id.clone(),
                infos,
            },
        );
    }

    /// Remove a task and stop its outputs
    fn end_task(&mut self, task_id: &TaskId) {
        let Some(hosted) = self.mixer.tasks.remove(task_id) else {
            return;
        };
        tracing::info!(task = %task_id, "Mixer task ended");
        if hosted.relaying {
            self.relay_update(hosted.owner, task_id, hosted.targets(), RelayCdnState::Stop);
        }
    }

    pub(super) fn start_mixer(&mut self, client: ClientId, seq: RequestId, task: MixerTask) {
        let task_id = task.task_id.clone();
        let targets: Vec<String> = task.output_targets().map(str::to_string).collect();

        let superseded: Vec<TaskId> = self
            .mixer
            .tasks
            .iter()
            .filter(|(id, hosted)| {
                **id != task_id && hosted.task.output_targets().any(|t| targets.iter().any(|o| o == t))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in superseded {
            tracing::info!(task = %id, successor = %task_id, "Mixer task superseded");
            self.end_task(&id);
        }

        let now = Instant::now();
        let previous = self.mixer.tasks.remove(&task_id);
        let inputs: BTreeMap<StreamId, Option<Instant>> = task
            .inputs
            .iter()
            .map(|input| {
                let id = &input.stream_id;
                let missing_since = if self.streams.contains_key(id) {
                    None
                } else {
                    let since = previous
                        .as_ref()
                        .and_then(|p| p.inputs.get(id).copied().flatten());
                    Some(since.unwrap_or(now))
                };
                (id.clone(), missing_since)
            })
            .collect();

        let (stopped, started): (Vec<String>, Vec<String>) = match &previous {
            Some(p) if p.relaying => {
                let old = p.targets();
                (
                    old.iter().filter(|t| !targets.contains(*t)).cloned().collect(),
                    targets.iter().filter(|t| !old.contains(*t)).cloned().collect(),
                )
            }
            _ => (Vec::new(), targets),
        };

        tracing::info!(
            client = %client,
            task = %task_id,
            inputs = task.inputs.len(),
            update = previous.is_some(),
            "Mixer task started"
        );
        self.mixer.tasks.insert(
            task_id.clone(),
            HostedTask {
                owner: client,
                task,
                inputs,
                stopping: false,
                relaying: true,
            },
        );

        self.deliver(
            client,
            Inbound::MixerStartResult {
                seq,
                error_code: ErrorCode::SUCCESS,
                extended_data: ExtendedData::new(),
            },
        );
        self.relay_update(client, &task_id, stopped, RelayCdnState::Stop);
        self.relay_update(client, &task_id, started, RelayCdnState::Start);
    }

    pub(super) fn stop_mixer(&mut self, client: ClientId, seq: RequestId, task_id: TaskId) {
        let Some(hosted) = self.mixer.tasks.get_mut(&task_id) else {
            return self.deliver(
                client,
                Inbound::RequestResult {
                    seq,
                    error_code: ErrorCode::MIXER_TASK_NOT_FOUND,
                },
            );
        };
        hosted.stopping = true;
        let idle = hosted.inputs.is_empty();

        self.deliver(
            client,
            Inbound::RequestResult {
                seq,
                error_code: ErrorCode::SUCCESS,
            },
        );
        if idle {
            self.end_task(&task_id);
        } else {
            tracing::info!(task = %task_id, "Mixer task stopping, outputs live until inputs are gone");
        }
    }

    pub(super) fn mixer_input_available(&mut self, stream_id: &StreamId) {
        for hosted in self.mixer.tasks.values_mut() {
            if let Some(missing_since) = hosted.inputs.get_mut(stream_id) {
                *missing_since = None;
            }
        }
    }

    pub(super) fn mixer_input_lost(&mut self, stream_id: &StreamId) {
        let now = Instant::now();
        for hosted in self.mixer.tasks.values_mut() {
            if let Some(missing_since) = hosted.inputs.get_mut(stream_id) {
                missing_since.get_or_insert(now);
            }
        }
    }

    /// Drop inputs missing past the grace window and end what is left empty
    pub(super) fn sweep_mixer(&mut self, now: Instant) {
        let grace = self.config.mixer_input_grace;
        let mut emptied = Vec::new();

        for (task_id, hosted) in self.mixer.tasks.iter_mut() {
            let before = hosted.inputs.len();
            hosted
                .inputs
                .retain(|_, missing_since| !missing_since.is_some_and(|at| now.duration_since(at) >= grace));
            if hosted.inputs.len() != before {
                tracing::info!(
                    task = %task_id,
                    dropped = before - hosted.inputs.len(),
                    remaining = hosted.inputs.len(),
                    "Missing mixer inputs dropped"
                );
            }
            if hosted.inputs.is_empty() && hosted.relaying {
                emptied.push(task_id.clone());
            }
        }

        for task_id in emptied {
            let Some(hosted) = self.mixer.tasks.get_mut(&task_id) else {
                continue;
            };
            if hosted.stopping {
                self.end_task(&task_id);
            } else {
                hosted.relaying = false;
                let (owner, targets) = (hosted.owner, hosted.targets());
                self.relay_update(owner, &task_id, targets, RelayCdnState::Stop);
            }
        }
    }
}
