use crate::{
    core::Millis,
    timeline::{Effect, RunId, StageView, TimerWheel},
};

/// Gap between consecutive bubble appends.
pub const CHAT_STAGGER_MS: u64 = 900;
/// At most this many bubbles render per call.
pub const MAX_MESSAGES: usize = 6;
/// Single line substituted when every input line is blank.
pub const PLACEHOLDER_LINE: &str = "未入力";

/// Target surface region for a chat render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelKind {
    SenderReaction,
    ReceiverReaction,
    ChatLayer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BubbleAlign {
    Giver,
    Receiver,
}

/// One rendered message entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatBubble {
    pub speaker: String,
    pub text: String,
    pub align: BubbleAlign,
}

/// A pending sequential render: which panel, whose lines, and how long after
/// the triggering stage the first bubble appears.
#[derive(Clone, Debug)]
pub struct ChatPlan {
    pub panel: PanelKind,
    pub lines: Vec<String>,
    pub speaker: String,
    pub align: BubbleAlign,
    pub base_delay_ms: u64,
}

/// Trims, drops blanks, caps at [`MAX_MESSAGES`], and substitutes the
/// placeholder when nothing is left.
pub fn plan_messages(lines: &[String]) -> Vec<String> {
    let filtered: Vec<String> = lines
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if filtered.is_empty() {
        return vec![PLACEHOLDER_LINE.to_string()];
    }
    filtered.into_iter().take(MAX_MESSAGES).collect()
}

/// Clears the target panel synchronously, then schedules one append per
/// message at `now + base_delay + index * 900`. Appends within a call are
/// strictly additive; only the next call for the same panel clears it.
pub fn render_sequential(
    wheel: &mut TimerWheel,
    run: RunId,
    view: &mut StageView,
    plan: &ChatPlan,
    now: Millis,
) {
    view.panel_mut(plan.panel).clear();
    let messages = plan_messages(&plan.lines);
    tracing::debug!(panel = ?plan.panel, count = messages.len(), "chat render planned");
    for (index, text) in messages.into_iter().enumerate() {
        let deadline = now.saturating_add(plan.base_delay_ms + (index as u64) * CHAT_STAGGER_MS);
        wheel.schedule(
            run,
            deadline,
            Effect::AppendBubble {
                panel: plan.panel,
                bubble: ChatBubble {
                    speaker: plan.speaker.clone(),
                    text,
                    align: plan.align,
                },
            },
        );
    }
}
