use giftbox::{
    Millis, PlayState, Player, PresentationData, PresentationScript, Stage,
    timeline::{
        STAGE_FADE_OUT_MS, STAGE_GIVER_CHAT_MS, STAGE_OPEN_BOX_MS, STAGE_RECEIVER_CHAT_MS,
        STAGE_REVEAL_MS, STAGE_SHOW_BOX_MS,
    },
};

fn scripted_player() -> Player {
    let data = PresentationData {
        giver_name: "A".to_string(),
        receiver_name: "B".to_string(),
        giver_lines: vec!["g1".into(), "g2".into(), "g3".into()],
        receiver_lines: vec!["r1".into(), "r2".into()],
        sender_reaction_lines: vec!["s1".into()],
        reaction_lines: vec!["x1".into(), "x2".into()],
        ..Default::default()
    };
    Player::new(PresentationScript::from_session(Some(&data), None))
}

/// Past the last scheduled effect of a full run.
const RUN_END_MS: u64 = 40_000;

#[test]
fn stage_timestamps_match_the_fixed_sequence() {
    let mut p = scripted_player();
    p.tap(Millis(0));
    p.advance_to(Millis(RUN_END_MS));
    assert_eq!(
        p.stage_offsets(),
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
}

#[test]
fn cancel_at_every_instant_freezes_the_view() {
    // Sweep cancellation across the whole run, including every stage edge
    // and the fade settle window. After cancelling, no further effect may
    // mutate the view.
    let mut instants: Vec<u64> = (0..=RUN_END_MS).step_by(250).collect();
    for (offset, _) in Stage::SEQUENCE {
        instants.extend([offset.saturating_sub(1), offset, offset + 1]);
    }
    instants.extend([
        STAGE_RECEIVER_CHAT_MS + 599,
        STAGE_RECEIVER_CHAT_MS + 600,
        STAGE_RECEIVER_CHAT_MS + 601,
    ]);

    for t in instants {
        let mut p = scripted_player();
        p.tap(Millis(0));
        p.advance_to(Millis(t));
        p.cancel_all();
        let frozen = p.view().clone();
        p.advance_to(Millis(RUN_END_MS * 4));
        assert_eq!(*p.view(), frozen, "stale effect fired after cancel at {t}");
        assert_eq!(p.pending_timers(), 0);
    }
}

#[test]
fn cancelled_run_never_interleaves_with_replay_run() {
    // Reference: one clean run from a replay start.
    let mut reference = scripted_player();
    reference.tap(Millis(0));
    reference.replay(Millis(0));
    reference.advance_to(Millis(RUN_END_MS * 2));
    let reference_view = reference.view().clone();

    for t in (0..=RUN_END_MS).step_by(500) {
        let mut p = scripted_player();
        p.tap(Millis(0));
        p.advance_to(Millis(t));
        p.replay(Millis(t));
        p.advance_to(Millis(t + RUN_END_MS * 2));
        assert_eq!(
            *p.view(),
            reference_view,
            "replay after cancel at {t} produced foreign effects"
        );
        assert_eq!(p.state(), PlayState::Completed);
    }
}

#[test]
fn replay_storm_leaves_exactly_one_run() {
    let mut p = scripted_player();
    p.tap(Millis(0));
    // Five replays inside one lead-in window.
    for t in [100u64, 300, 500, 700, 900] {
        p.replay(Millis(t));
    }
    p.advance_to(Millis(RUN_END_MS * 2));
    assert_eq!(p.run_started_at(), Some(Millis(1_900)));
    assert_eq!(p.stage_offsets().len(), 6);
    assert_eq!(p.state(), PlayState::Completed);
}

#[test]
fn gesture_after_replay_does_not_restart() {
    let mut p = scripted_player();
    p.tap(Millis(0));
    p.advance_to(Millis(1_000));
    p.replay(Millis(1_000));
    p.tap(Millis(1_100));
    p.advance_to(Millis(RUN_END_MS * 2));
    // The replay's run survived; the tap was ignored.
    assert_eq!(p.run_started_at(), Some(Millis(2_000)));
}
