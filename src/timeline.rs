use std::sync::Arc;

use crate::{
    chat::{self, BubbleAlign, ChatBubble, ChatPlan, PanelKind},
    core::{ImageSlot, Millis},
    resolve::{self, DisplayRef},
    session::{
        DEFAULT_AUTHOR_LABEL, DEFAULT_GIVER_NAME, DEFAULT_RECEIVER_NAME, PresentationData,
    },
    store::BlobCache,
};

/// Fixed stage offsets relative to the owning `start()` call.
pub const STAGE_SHOW_BOX_MS: u64 = 500;
pub const STAGE_OPEN_BOX_MS: u64 = 2800;
pub const STAGE_REVEAL_MS: u64 = 4200;
pub const STAGE_FADE_OUT_MS: u64 = 14200;
pub const STAGE_GIVER_CHAT_MS: u64 = 15200;
pub const STAGE_RECEIVER_CHAT_MS: u64 = 25200;

/// A fade waits this long before applying its background swap.
pub const FADE_SETTLE_MS: u64 = 600;
/// Delay between a replay request and the restarted run.
pub const REPLAY_LEAD_IN_MS: u64 = 1000;

/// One playback run's generation. Every timer carries the generation that
/// scheduled it; cancelling a run invalidates its whole set at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Named points of the fixed reveal sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ShowBox,
    OpenBox,
    Reveal,
    FadeOut,
    GiverChat,
    ReceiverChat,
}

impl Stage {
    pub const SEQUENCE: [(u64, Stage); 6] = [
        (STAGE_SHOW_BOX_MS, Stage::ShowBox),
        (STAGE_OPEN_BOX_MS, Stage::OpenBox),
        (STAGE_REVEAL_MS, Stage::Reveal),
        (STAGE_FADE_OUT_MS, Stage::FadeOut),
        (STAGE_GIVER_CHAT_MS, Stage::GiverChat),
        (STAGE_RECEIVER_CHAT_MS, Stage::ReceiverChat),
    ];
}

/// A deferred visual-state change owned by one run.
#[derive(Clone, Debug)]
pub enum Effect {
    /// Auxiliary timer: hides the creator watermark frame.
    HideCreatorFrame,
    /// Enter one stage of the fixed sequence.
    Stage(Stage),
    /// Sequential chat append scheduled by a render call.
    AppendBubble { panel: PanelKind, bubble: ChatBubble },
    /// A fade's settle elapsing: apply the queued background swap, then
    /// start the follow-up chat render if one rides along.
    ApplyFade {
        background: DisplayRef,
        follow: Option<ChatPlan>,
    },
    /// A replay lead-in elapsing.
    RestartRun,
}

#[derive(Debug)]
struct TimerEntry {
    id: TimerId,
    run: RunId,
    deadline: Millis,
    seq: u64,
    effect: Effect,
}

/// Owned set of cancellable timers. Firing order is (deadline, schedule
/// order); cancellation removes entries so a dead run can produce no
/// further effects, including nested ones it queued before dying.
#[derive(Debug, Default)]
pub struct TimerWheel {
    entries: Vec<TimerEntry>,
    next_id: u64,
    next_seq: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, run: RunId, deadline: Millis, effect: Effect) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(TimerEntry {
            id,
            run,
            deadline,
            seq,
            effect,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn cancel_run(&mut self, run: RunId) {
        self.entries.retain(|e| e.run != run);
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    fn pop_due(&mut self, now: Millis) -> Option<TimerEntry> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline <= now)
            .min_by_key(|(_, e)| (e.deadline, e.seq))
            .map(|(i, _)| i)?;
        Some(self.entries.remove(idx))
    }
}

/// The presentation's visible state: stage flags, background, and the three
/// append-only bubble panels. This is what the frame renderer consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct StageView {
    pub show_box: bool,
    pub box_shaking: bool,
    pub open_box: bool,
    pub reveal: bool,
    pub fade: bool,
    pub chat: bool,
    pub chat_giver: bool,
    pub chat_receiver: bool,
    pub creator_frame_hidden: bool,
    pub background: DisplayRef,
    pub chat_background: DisplayRef,
    pub sender_reaction: Vec<ChatBubble>,
    pub receiver_reaction: Vec<ChatBubble>,
    pub chat_layer: Vec<ChatBubble>,
}

impl StageView {
    /// The pre-run baseline every `start()` resets to.
    pub fn baseline() -> Self {
        Self {
            show_box: false,
            box_shaking: false,
            open_box: false,
            reveal: false,
            fade: false,
            chat: false,
            chat_giver: false,
            chat_receiver: false,
            creator_frame_hidden: false,
            background: DisplayRef::path(resolve::WAIT_BACKGROUND),
            chat_background: DisplayRef::path(resolve::WAIT_BACKGROUND),
            sender_reaction: Vec::new(),
            receiver_reaction: Vec::new(),
            chat_layer: Vec::new(),
        }
    }

    pub fn panel(&self, panel: PanelKind) -> &[ChatBubble] {
        match panel {
            PanelKind::SenderReaction => &self.sender_reaction,
            PanelKind::ReceiverReaction => &self.receiver_reaction,
            PanelKind::ChatLayer => &self.chat_layer,
        }
    }

    pub fn panel_mut(&mut self, panel: PanelKind) -> &mut Vec<ChatBubble> {
        match panel {
            PanelKind::SenderReaction => &mut self.sender_reaction,
            PanelKind::ReceiverReaction => &mut self.receiver_reaction,
            PanelKind::ChatLayer => &mut self.chat_layer,
        }
    }
}

/// Fully defaulted playback inputs: display names, line groups, and resolved
/// image references. Built once when the presentation loads; read-only while
/// it plays.
#[derive(Clone, Debug)]
pub struct PresentationScript {
    pub giver_name: String,
    pub receiver_name: String,
    pub author_name: String,
    pub giver_lines: Vec<String>,
    pub sender_reaction_lines: Vec<String>,
    pub receiver_lines: Vec<String>,
    pub reaction_lines: Vec<String>,
    pub giver_image: DisplayRef,
    pub receiver_image: DisplayRef,
    pub gift_image: DisplayRef,
}

impl PresentationScript {
    /// Reconstructs playback inputs from the handoff record plus the blob
    /// cache. Absent record, absent blobs, and skip flags all degrade to the
    /// bundled defaults; nothing here can fail.
    pub fn from_session(data: Option<&PresentationData>, cache: Option<&dyn BlobCache>) -> Self {
        let gift_fallback = resolve::gift_fallback(data.map(|d| d.gift_type.as_str()).unwrap_or(""));
        Self {
            giver_name: non_blank(data.map(|d| d.giver_name.as_str()), DEFAULT_GIVER_NAME),
            receiver_name: non_blank(data.map(|d| d.receiver_name.as_str()), DEFAULT_RECEIVER_NAME),
            author_name: non_blank(data.map(|d| d.author_name.as_str()), DEFAULT_AUTHOR_LABEL),
            giver_lines: lines_of(data, |d| &d.giver_lines),
            sender_reaction_lines: lines_of(data, |d| &d.sender_reaction_lines),
            receiver_lines: lines_of(data, |d| &d.receiver_lines),
            reaction_lines: lines_of(data, |d| &d.reaction_lines),
            giver_image: slot_image(data, cache, ImageSlot::Giver, resolve::DEFAULT_GIVER_IMAGE),
            receiver_image: slot_image(
                data,
                cache,
                ImageSlot::Receiver,
                resolve::DEFAULT_RECEIVER_IMAGE,
            ),
            gift_image: slot_image(data, cache, ImageSlot::Gift, gift_fallback),
        }
    }

    /// Watermark label shown on the creator frame.
    pub fn watermark(&self) -> String {
        format!("Creator by {}", self.author_name)
    }
}

fn non_blank(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn lines_of(
    data: Option<&PresentationData>,
    pick: impl Fn(&PresentationData) -> &Vec<String>,
) -> Vec<String> {
    data.map(|d| pick(d).clone()).unwrap_or_default()
}

fn slot_image(
    data: Option<&PresentationData>,
    cache: Option<&dyn BlobCache>,
    slot: ImageSlot,
    fallback: &str,
) -> DisplayRef {
    let Some(data) = data else {
        return restored_or(cache, slot, DisplayRef::path(fallback));
    };
    if data.skip(slot) {
        return DisplayRef::path(fallback);
    }
    let descriptor = data.descriptor(slot);
    let resolved = resolve::resolve(&descriptor, fallback);
    if descriptor.data.is_some() {
        return resolved;
    }
    restored_or(cache, slot, resolved)
}

fn restored_or(cache: Option<&dyn BlobCache>, slot: ImageSlot, fallback: DisplayRef) -> DisplayRef {
    let Some(cache) = cache else {
        return fallback;
    };
    match cache.get(slot) {
        Ok(Some(bytes)) if !bytes.is_empty() => DisplayRef::Bytes(Arc::new(bytes)),
        Ok(_) => fallback,
        Err(e) => {
            tracing::warn!(slot = slot.storage_key(), error = %e, "blob restore failed");
            fallback
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Running,
    Cancelled,
    Completed,
}

/// Drives the reveal timeline on a caller-owned millisecond clock. All
/// pending work lives in the timer wheel under the current run's generation,
/// so cancellation is total: once a run is cancelled, none of its stage,
/// chat, or fade effects can fire, no matter how deeply nested.
#[derive(Debug)]
pub struct Player {
    script: PresentationScript,
    view: StageView,
    wheel: TimerWheel,
    state: PlayState,
    run: RunId,
    next_run: u64,
    replay_timer: Option<TimerId>,
    creator_hide_timer: Option<TimerId>,
    gesture_seen: bool,
    run_started_at: Option<Millis>,
    stage_history: Vec<(Millis, Stage)>,
}

impl Player {
    pub fn new(script: PresentationScript) -> Self {
        Self {
            script,
            view: StageView::baseline(),
            wheel: TimerWheel::new(),
            state: PlayState::Idle,
            run: RunId(0),
            next_run: 1,
            replay_timer: None,
            creator_hide_timer: None,
            gesture_seen: false,
            run_started_at: None,
            stage_history: Vec::new(),
        }
    }

    pub fn view(&self) -> &StageView {
        &self.view
    }

    pub fn script(&self) -> &PresentationScript {
        &self.script
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn run_started_at(&self) -> Option<Millis> {
        self.run_started_at
    }

    /// Stage entries of the current run as (offset from run start, stage).
    pub fn stage_offsets(&self) -> Vec<(u64, Stage)> {
        let Some(start) = self.run_started_at else {
            return Vec::new();
        };
        self.stage_history
            .iter()
            .map(|(at, stage)| (at.saturating_sub(start), *stage))
            .collect()
    }

    pub fn pending_timers(&self) -> usize {
        self.wheel.pending()
    }

    /// Whether a replay lead-in is waiting to restart the run.
    pub fn replay_pending(&self) -> bool {
        self.replay_timer.is_some()
    }

    /// Whether the auxiliary creator-frame-hide timer is still armed.
    pub fn creator_hide_pending(&self) -> bool {
        self.creator_hide_timer.is_some()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.wheel.next_deadline()
    }

    fn alloc_run(&mut self) -> RunId {
        let run = RunId(self.next_run);
        self.next_run += 1;
        run
    }

    /// Begins a fresh run at `now`: resets the view to baseline and schedules
    /// the fixed stage sequence, plus the auxiliary creator-frame-hide timer
    /// at `creator_hide_delay_ms`. Stage offsets are relative to this call,
    /// never to the auxiliary timer.
    pub fn start(&mut self, now: Millis, creator_hide_delay_ms: u64) {
        self.wheel.cancel_all();
        self.replay_timer = None;
        self.creator_hide_timer = None;

        self.run = self.alloc_run();
        self.view = StageView::baseline();
        self.stage_history.clear();
        self.run_started_at = Some(now);
        self.state = PlayState::Running;

        self.creator_hide_timer = Some(self.wheel.schedule(
            self.run,
            now.saturating_add(creator_hide_delay_ms),
            Effect::HideCreatorFrame,
        ));
        for (offset, stage) in Stage::SEQUENCE {
            self.wheel
                .schedule(self.run, now.saturating_add(offset), Effect::Stage(stage));
        }
        tracing::debug!(run = self.run.0, at = now.0, "timeline started");
    }

    /// Invalidates every pending timer of the current run, including the
    /// replay lead-in and any in-flight fade settle. A cancelled run
    /// produces zero further observable effects.
    pub fn cancel_all(&mut self) {
        self.wheel.cancel_all();
        self.replay_timer = None;
        self.creator_hide_timer = None;
        if self.state == PlayState::Running {
            self.state = PlayState::Cancelled;
        }
        tracing::debug!(run = self.run.0, "timeline cancelled");
    }

    /// First-gesture entry point: starts playback exactly once; later
    /// gestures are ignored while any run exists.
    pub fn tap(&mut self, now: Millis) {
        if self.gesture_seen {
            return;
        }
        self.gesture_seen = true;
        self.cancel_all();
        self.start(now, 0);
    }

    /// Cancels the current run and schedules a restart after the fixed
    /// lead-in. A second replay during the lead-in cancels the pending
    /// restart rather than stacking a run.
    pub fn replay(&mut self, now: Millis) {
        self.gesture_seen = true;
        self.cancel_all();
        let run = self.alloc_run();
        self.run = run;
        self.replay_timer = Some(self.wheel.schedule(
            run,
            now.saturating_add(REPLAY_LEAD_IN_MS),
            Effect::RestartRun,
        ));
    }

    /// Fires every due timer in (deadline, schedule order). Effects that
    /// queue follow-up work schedule it relative to their own deadline, so a
    /// large step still fires nested timers at their correct instants.
    pub fn advance_to(&mut self, now: Millis) {
        while let Some(entry) = self.wheel.pop_due(now) {
            // Entries of a superseded run never fire.
            if entry.run != self.run {
                continue;
            }
            self.fire(entry.deadline, entry.effect);
        }
        if self.state == PlayState::Running && self.wheel.pending() == 0 {
            self.state = PlayState::Completed;
            tracing::debug!(run = self.run.0, "timeline completed");
        }
    }

    fn fire(&mut self, at: Millis, effect: Effect) {
        match effect {
            Effect::HideCreatorFrame => {
                self.view.creator_frame_hidden = true;
                self.creator_hide_timer = None;
            }
            Effect::RestartRun => {
                self.replay_timer = None;
                self.start(at, REPLAY_LEAD_IN_MS);
            }
            Effect::AppendBubble { panel, bubble } => {
                self.view.panel_mut(panel).push(bubble);
            }
            Effect::ApplyFade { background, follow } => {
                self.view.background = background;
                self.view.fade = false;
                if let Some(plan) = follow {
                    chat::render_sequential(&mut self.wheel, self.run, &mut self.view, &plan, at);
                }
            }
            Effect::Stage(stage) => {
                self.stage_history.push((at, stage));
                self.enter_stage(stage, at);
            }
        }
    }

    fn enter_stage(&mut self, stage: Stage, at: Millis) {
        match stage {
            Stage::ShowBox => {
                self.view.show_box = true;
                self.view.box_shaking = true;
            }
            Stage::OpenBox => {
                self.view.box_shaking = false;
                self.view.open_box = true;
                self.view.background = DisplayRef::path(resolve::RESULT_BACKGROUND);
            }
            Stage::Reveal => {
                self.view.reveal = true;
                let sender = ChatPlan {
                    panel: PanelKind::SenderReaction,
                    lines: self.script.sender_reaction_lines.clone(),
                    speaker: self.script.giver_name.clone(),
                    align: BubbleAlign::Giver,
                    base_delay_ms: 0,
                };
                let receiver = ChatPlan {
                    panel: PanelKind::ReceiverReaction,
                    lines: self.script.reaction_lines.clone(),
                    speaker: self.script.receiver_name.clone(),
                    align: BubbleAlign::Receiver,
                    base_delay_ms: 0,
                };
                chat::render_sequential(&mut self.wheel, self.run, &mut self.view, &sender, at);
                chat::render_sequential(&mut self.wheel, self.run, &mut self.view, &receiver, at);
            }
            Stage::FadeOut => {
                self.view.fade = true;
            }
            Stage::GiverChat => {
                // Background swaps before the first giver bubble can appear.
                self.view.fade = false;
                self.view.chat = true;
                self.view.chat_giver = true;
                self.view.chat_background = self.script.giver_image.clone();
                self.view.background = self.script.giver_image.clone();
                let plan = ChatPlan {
                    panel: PanelKind::ChatLayer,
                    lines: self.script.giver_lines.clone(),
                    speaker: self.script.giver_name.clone(),
                    align: BubbleAlign::Giver,
                    base_delay_ms: 0,
                };
                chat::render_sequential(&mut self.wheel, self.run, &mut self.view, &plan, at);
            }
            Stage::ReceiverChat => {
                self.view.chat_giver = false;
                self.view.chat_receiver = true;
                self.view.chat_background = self.script.receiver_image.clone();
                // The swap rides the fade settle; the receiver render only
                // starts once the new background applied.
                self.view.fade = true;
                let follow = ChatPlan {
                    panel: PanelKind::ChatLayer,
                    lines: self.script.receiver_lines.clone(),
                    speaker: self.script.receiver_name.clone(),
                    align: BubbleAlign::Receiver,
                    base_delay_ms: 0,
                };
                self.wheel.schedule(
                    self.run,
                    at.saturating_add(FADE_SETTLE_MS),
                    Effect::ApplyFade {
                        background: self.script.receiver_image.clone(),
                        follow: Some(follow),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(PresentationScript::from_session(None, None))
    }

    #[test]
    fn defaults_when_no_session() {
        let script = PresentationScript::from_session(None, None);
        assert_eq!(script.giver_name, DEFAULT_GIVER_NAME);
        assert_eq!(script.receiver_name, DEFAULT_RECEIVER_NAME);
        assert_eq!(script.author_name, DEFAULT_AUTHOR_LABEL);
        assert_eq!(
            script.gift_image,
            DisplayRef::path("assets/images/present1.png")
        );
        assert_eq!(script.watermark(), "Creator by 未入力");
    }

    #[test]
    fn tap_starts_exactly_once() {
        let mut p = player();
        p.tap(Millis(10));
        assert_eq!(p.state(), PlayState::Running);
        let started = p.run_started_at().unwrap();
        p.tap(Millis(500));
        p.tap(Millis(900));
        assert_eq!(p.run_started_at().unwrap(), started);
    }

    #[test]
    fn full_run_hits_every_stage_once_in_order() {
        let mut p = player();
        p.tap(Millis(0));
        p.advance_to(Millis(60_000));
        let offsets = p.stage_offsets();
        assert_eq!(
            offsets,
            vec![
                (STAGE_SHOW_BOX_MS, Stage::ShowBox),
                (STAGE_OPEN_BOX_MS, Stage::OpenBox),
                (STAGE_REVEAL_MS, Stage::Reveal),
                (STAGE_FADE_OUT_MS, Stage::FadeOut),
                (STAGE_GIVER_CHAT_MS, Stage::GiverChat),
                (STAGE_RECEIVER_CHAT_MS, Stage::ReceiverChat),
            ]
        );
        assert_eq!(p.state(), PlayState::Completed);
        // Placeholder bubbles rendered into every panel.
        assert_eq!(p.view().sender_reaction.len(), 1);
        assert_eq!(p.view().receiver_reaction.len(), 1);
        assert_eq!(p.view().chat_layer.len(), 1);
    }

    #[test]
    fn receiver_background_swaps_before_first_bubble() {
        let mut p = player();
        p.tap(Millis(0));
        // Just past the receiver stage but before its fade settles.
        p.advance_to(Millis(STAGE_RECEIVER_CHAT_MS + FADE_SETTLE_MS - 1));
        assert!(p.view().fade);
        assert_ne!(p.view().background, p.script().receiver_image);
        // The settle applies the swap, clears the giver bubbles, and only
        // then renders the receiver side.
        p.advance_to(Millis(STAGE_RECEIVER_CHAT_MS + FADE_SETTLE_MS));
        assert!(!p.view().fade);
        assert_eq!(p.view().background, p.script().receiver_image);
        assert_eq!(p.view().chat_layer.len(), 1);
        assert_eq!(p.view().chat_layer[0].align, BubbleAlign::Receiver);
    }

    #[test]
    fn cancelled_fade_never_applies_its_swap() {
        let mut p = player();
        p.tap(Millis(0));
        // Enter the receiver stage so the settle timer is in flight.
        p.advance_to(Millis(STAGE_RECEIVER_CHAT_MS));
        let background = p.view().background.clone();
        p.cancel_all();
        p.advance_to(Millis(120_000));
        assert_eq!(p.view().background, background);
        assert_eq!(p.state(), PlayState::Cancelled);
    }

    #[test]
    fn replay_lead_in_shifts_stages_not_creator_hide() {
        let mut p = player();
        p.tap(Millis(0));
        p.advance_to(Millis(3_000));
        p.replay(Millis(3_000));
        assert!(p.replay_pending());
        // Lead-in: nothing fires until 4000.
        p.advance_to(Millis(3_999));
        assert_eq!(p.state(), PlayState::Cancelled);
        assert!(p.replay_pending());
        p.advance_to(Millis(4_000 + STAGE_SHOW_BOX_MS));
        assert_eq!(p.state(), PlayState::Running);
        assert!(!p.replay_pending());
        assert_eq!(p.run_started_at(), Some(Millis(4_000)));
        assert_eq!(p.stage_offsets(), vec![(STAGE_SHOW_BOX_MS, Stage::ShowBox)]);
        // Creator frame hides at start + lead-in, stages keep their offsets.
        assert!(p.creator_hide_pending());
        assert!(!p.view().creator_frame_hidden);
        p.advance_to(Millis(5_000));
        assert!(!p.creator_hide_pending());
        assert!(p.view().creator_frame_hidden);
    }

    #[test]
    fn double_replay_collapses_to_one_run() {
        let mut p = player();
        p.tap(Millis(0));
        p.replay(Millis(100));
        p.replay(Millis(500));
        p.advance_to(Millis(120_000));
        let offsets = p.stage_offsets();
        assert_eq!(offsets.len(), 6, "stages fired exactly once: {offsets:?}");
        assert_eq!(p.run_started_at(), Some(Millis(1_500)));
        assert_eq!(p.state(), PlayState::Completed);
    }

    #[test]
    fn reveal_panels_fill_concurrently_with_stagger() {
        let data = PresentationData {
            sender_reaction_lines: vec!["わあ".into(), "すごい".into()],
            reaction_lines: vec!["ありがとう".into()],
            ..Default::default()
        };
        let mut p = Player::new(PresentationScript::from_session(Some(&data), None));
        p.tap(Millis(0));
        p.advance_to(Millis(STAGE_REVEAL_MS));
        assert_eq!(p.view().sender_reaction.len(), 1);
        assert_eq!(p.view().receiver_reaction.len(), 1);
        p.advance_to(Millis(STAGE_REVEAL_MS + 900));
        assert_eq!(p.view().sender_reaction.len(), 2);
        assert_eq!(p.view().receiver_reaction.len(), 1);
    }
}
