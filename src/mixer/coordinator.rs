//! Client-side view of mixer tasks
//!
//! Mixing runs on the service; the engine only tracks each task it started
//! through `Starting -> Running -> Stopping` and echoes relay states of the
//! task outputs. A stopped task stays in `Stopping` until every output relay
//! has stopped, since the service may keep a task without successor alive
//! until its inputs are gone.

use std::collections::BTreeMap;

use crate::dispatch::{Event, ExtendedData};
use crate::engine::completion::{Completion, Responder};
use crate::engine::state::{EngineState, Outbox};
use crate::error::{ErrorCode, Result};
use crate::ids::TaskId;
use crate::relay::{RelayCdnInfo, RelayTable};
use crate::signaling::{Request, RequestId};

use super::task::{MixerStartResult, MixerTask};

/// Where a mixer task is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerTaskPhase {
    /// Start (or update) sent, waiting for the service
    Starting,
    Running,
    /// Stop sent; outputs may still be relaying
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting(RequestId),
    Running,
    Stopping(Option<RequestId>),
}

struct TaskRecord {
    phase: Phase,
    task: MixerTask,
    relays: RelayTable,
}

impl TaskRecord {
    fn is_finished(&self) -> bool {
        self.phase == Phase::Stopping(None) && self.relays.all_stopped()
    }
}

/// Mixer tasks started by this engine
#[derive(Default)]
pub(crate) struct MixerCoordinator {
    tasks: BTreeMap<TaskId, TaskRecord>,
}

impl MixerCoordinator {
    pub(crate) fn phase(&self, task_id: &TaskId) -> Option<MixerTaskPhase> {
        self.tasks.get(task_id).map(|record| match record.phase {
            Phase::Starting(_) => MixerTaskPhase::Starting,
            Phase::Running => MixerTaskPhase::Running,
            Phase::Stopping(_) => MixerTaskPhase::Stopping,
        })
    }

    pub(crate) fn task(&self, task_id: &TaskId) -> Option<&MixerTask> {
        self.tasks.get(task_id).map(|record| &record.task)
    }

    pub(crate) fn relays(&self, task_id: &TaskId) -> Vec<RelayCdnInfo> {
        self.tasks
            .get(task_id)
            .map(|record| record.relays.snapshot())
            .unwrap_or_default()
    }

    fn starting(&mut self, seq: RequestId, task: MixerTask) {
        match self.tasks.get_mut(&task.task_id) {
            Some(record) => {
                record.phase = Phase::Starting(seq);
                record.task = task;
            }
            None => {
                self.tasks.insert(
                    task.task_id.clone(),
                    TaskRecord {
                        phase: Phase::Starting(seq),
                        task,
                        relays: RelayTable::new(),
                    },
                );
            }
        }
    }

    fn on_start_result(&mut self, seq: RequestId, error_code: ErrorCode) {
        let Some((task_id, record)) = self
            .tasks
            .iter_mut()
            .find(|(_, r)| r.phase == Phase::Starting(seq))
        else {
            return;
        };

        if error_code.is_success() {
            tracing::info!(task = %task_id, "Mixer task running");
            record.phase = Phase::Running;
        } else {
            tracing::warn!(task = %task_id, error_code = %error_code, "Mixer task rejected");
            let task_id = task_id.clone();
            self.tasks.remove(&task_id);
        }
    }

    /// Resolve a stop acknowledgement; unrelated sequence numbers are ignored
    pub(crate) fn on_stop_result(&mut self, seq: RequestId, error_code: ErrorCode) {
        let Some((task_id, record)) = self
            .tasks
            .iter_mut()
            .find(|(_, r)| r.phase == Phase::Stopping(Some(seq)))
        else {
            return;
        };

        record.phase = Phase::Stopping(None);
        if !error_code.is_success() || record.is_finished() {
            tracing::info!(task = %task_id, error_code = %error_code, "Mixer task ended");
            let task_id = task_id.clone();
            self.tasks.remove(&task_id);
        }
    }

    /// Requests in flight are lost with the link
    pub(crate) fn on_link_down(&mut self) {
        self.tasks
            .retain(|_, record| !matches!(record.phase, Phase::Starting(_)));
        for record in self.tasks.values_mut() {
            if let Phase::Stopping(Some(_)) = record.phase {
                record.phase = Phase::Stopping(None);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }
}

impl EngineState {
    pub(crate) fn start_mixer_task(
        &mut self,
        task: MixerTask,
        out: &mut Outbox,
    ) -> Result<Completion<MixerStartResult>> {
        task.validate()?;
        if !self.link_up {
            return Ok(Completion::ready(MixerStartResult::from(
                ErrorCode::NETWORK_INTERRUPTED,
            )));
        }

        let seq = self.next_seq();
        tracing::info!(
            task = %task.task_id,
            inputs = task.inputs.len(),
            outputs = task.outputs.len(),
            "Starting mixer task"
        );

        self.mixer.starting(seq, task.clone());
        out.send(Request::StartMixer { seq, task });
        Ok(self.completions.mixer_start(seq))
    }

    pub(crate) fn stop_mixer_task(&mut self, task_id: TaskId, out: &mut Outbox) -> Completion<ErrorCode> {
        if !self.link_up {
            return Completion::ready(ErrorCode::NETWORK_INTERRUPTED);
        }

        let seq = self.next_seq();
        if let Some(record) = self.mixer.tasks.get_mut(&task_id) {
            record.phase = Phase::Stopping(Some(seq));
        }

        tracing::info!(task = %task_id, "Stopping mixer task");
        out.send(Request::StopMixer { seq, task_id });
        self.completions.code(seq, None)
    }

    pub(crate) fn on_mixer_start_result(
        &mut self,
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    ) {
        self.mixer.on_start_result(seq, error_code);

        match self.completions.take(seq) {
            Some(Responder::MixerStart(tx)) => {
                let _ = tx.send(MixerStartResult {
                    error_code,
                    extended_data,
                });
            }
            Some(other) => other.fail(error_code),
            None => tracing::debug!(seq = seq, "Mixer start result for unknown request dropped"),
        }
    }

    pub(crate) fn on_mixer_relay_update(&mut self, task_id: &TaskId, infos: Vec<RelayCdnInfo>, out: &mut Outbox) {
        let Some(record) = self.mixer.tasks.get_mut(task_id) else {
            tracing::debug!(task = %task_id, "Relay update for unknown mixer task dropped");
            return;
        };

        if record.relays.apply_all(infos) {
            out.emit(Event::MixerRelayCdnStateUpdate {
                task_id: task_id.clone(),
                infos: record.relays.snapshot(),
            });
        }
        if record.is_finished() {
            tracing::info!(task = %task_id, "Mixer task outputs stopped");
            self.mixer.tasks.remove(task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::testing::*;
    use crate::ids::StreamId;
    use crate::media::Rect;
    use crate::mixer::{MixerInput, MixerInputContentType, MixerOutput};
    use crate::relay::{RelayCdnState, RelayCdnUpdateReason};
    use crate::signaling::Inbound;

    const OUTPUT: &str = "rtmp://cdn/live/mix";

    fn task(id: &str) -> MixerTask {
        MixerTask::new(id)
            .unwrap()
            .input(MixerInput::new(
                StreamId::new("s1").unwrap(),
                MixerInputContentType::Video,
                Rect::new(0, 0, 360, 640),
            ))
            .output(MixerOutput::new(OUTPUT))
    }

    fn task_id(id: &str) -> TaskId {
        TaskId::new(id).unwrap()
    }

    fn relay(state: RelayCdnState, time: u64) -> Inbound {
        Inbound::MixerRelayCdnUpdate {
            task_id: task_id("t1"),
            infos: vec![RelayCdnInfo::new(OUTPUT, state, RelayCdnUpdateReason::None, time)],
        }
    }

    fn sent_seq(out: &Outbox) -> RequestId {
        match &out.requests[..] {
            [Request::StartMixer { seq, .. }] | [Request::StopMixer { seq, .. }] => *seq,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut state = state();
        let mut out = Outbox::default();
        let completion = state.start_mixer_task(task("t1"), &mut out).unwrap();
        assert_eq!(state.mixer.phase(&task_id("t1")), Some(MixerTaskPhase::Starting));

        let mut urls = ExtendedData::new();
        urls.insert("flv".into(), vec!["http://cdn/live/mix.flv".into()]);
        state.on_mixer_start_result(sent_seq(&out), ErrorCode::SUCCESS, urls.clone());

        let result = completion.await;
        assert_eq!(result.error_code, ErrorCode::SUCCESS);
        assert_eq!(result.extended_data, urls);
        assert_eq!(state.mixer.phase(&task_id("t1")), Some(MixerTaskPhase::Running));

        let out = input(&mut state, relay(RelayCdnState::Start, 10));
        assert_eq!(kinds(&out), vec!["mixer_relay_cdn_state_update"]);

        let mut out = Outbox::default();
        let stopped = state.stop_mixer_task(task_id("t1"), &mut out);
        input(
            &mut state,
            Inbound::RequestResult {
                seq: sent_seq(&out),
                error_code: ErrorCode::SUCCESS,
            },
        );
        assert_eq!(stopped.await, ErrorCode::SUCCESS);

        // Outputs keep relaying after the stop
        assert_eq!(state.mixer.phase(&task_id("t1")), Some(MixerTaskPhase::Stopping));

        let out = input(&mut state, relay(RelayCdnState::Stop, 20));
        assert_eq!(kinds(&out), vec!["mixer_relay_cdn_state_update"]);
        assert_eq!(state.mixer.phase(&task_id("t1")), None);
    }

    #[tokio::test]
    async fn test_rejected_start() {
        let mut state = state();
        let mut out = Outbox::default();
        let completion = state.start_mixer_task(task("t1"), &mut out).unwrap();

        state.on_mixer_start_result(sent_seq(&out), ErrorCode::MIXER_NO_INPUT, ExtendedData::new());
        assert_eq!(completion.await.error_code, ErrorCode::MIXER_NO_INPUT);
        assert_eq!(state.mixer.phase(&task_id("t1")), None);
    }

    #[test]
    fn test_invalid_task_rejected_locally() {
        let mut state = state();
        let mut out = Outbox::default();
        let empty = MixerTask::new("t1").unwrap();

        assert!(state.start_mixer_task(empty, &mut out).is_err());
        assert!(out.requests.is_empty());
    }

    #[tokio::test]
    async fn test_link_down_fails_start() {
        let mut state = state();
        let mut out = Outbox::default();
        let completion = state.start_mixer_task(task("t1"), &mut out).unwrap();

        input(&mut state, Inbound::LinkDown);
        assert_eq!(completion.await.error_code, ErrorCode::NETWORK_INTERRUPTED);
        assert_eq!(state.mixer.phase(&task_id("t1")), None);

        let completion = state
            .start_mixer_task(task("t1"), &mut Outbox::default())
            .unwrap();
        assert_eq!(completion.await.error_code, ErrorCode::NETWORK_INTERRUPTED);
    }

    #[test]
    fn test_stop_without_relays_ends_task() {
        let mut state = state();
        let mut out = Outbox::default();
        let _ = state.start_mixer_task(task("t1"), &mut out).unwrap();
        state.on_mixer_start_result(sent_seq(&out), ErrorCode::SUCCESS, ExtendedData::new());

        let mut out = Outbox::default();
        let _ = state.stop_mixer_task(task_id("t1"), &mut out);
        input(
            &mut state,
            Inbound::RequestResult {
                seq: sent_seq(&out),
                error_code: ErrorCode::SUCCESS,
            },
        );
        assert_eq!(state.mixer.phase(&task_id("t1")), None);
    }
}
