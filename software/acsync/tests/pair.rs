//! Two nodes stepped cycle by cycle over an in-memory link.

use acsync::peripheral::{Channel, HwCall, MockupBoard};
use acsync::socket::MemoryLink;
use acsync::socket::memory::Wire;
use acsync::{Command, Controller, ControllerCtx, CurrentFollower, Node, NodeIo, VoltageSource};
use acsync_shared::{Mode, PhaseCode};

struct Pair {
    server: Node,
    client: Node,
    server_board: MockupBoard,
    client_board: MockupBoard,
    wire: Wire,
}

fn board_with_readings(i1: f32) -> MockupBoard {
    let board = MockupBoard::new();
    board.set_reading(Channel::I1Low, i1);
    board.set_reading(Channel::I2Low, 0.0);
    board.set_reading(Channel::V1Low, 0.0);
    board.set_reading(Channel::V2Low, 0.0);
    board.set_reading(Channel::VHigh, 80.0);
    board
}

fn io(board: &MockupBoard, link: MemoryLink) -> NodeIo {
    NodeIo {
        acquisition: Box::new(board.clone()),
        actuation: Box::new(board.clone()),
        link: Box::new(link),
        sync: Box::new(board.clone()),
    }
}

impl Pair {
    fn new(follower: CurrentFollower) -> Self {
        let (server_link, client_link) = MemoryLink::pair();
        let wire = server_link.wire();
        let server_board = board_with_readings(2.0);
        let client_board = board_with_readings(0.0);

        let server = Controller::new(ControllerCtx::default(), Box::new(VoltageSource::default()))
            .prepare(io(&server_board, server_link))
            .unwrap();
        let client = Controller::new(ControllerCtx::default(), Box::new(follower))
            .prepare(io(&client_board, client_link))
            .unwrap();

        Self {
            server,
            client,
            server_board,
            client_board,
            wire,
        }
    }

    /// One control period on both nodes; the server's record is delivered
    /// during its tick and consumed by the client in the same period.
    fn step(&mut self, n: usize) {
        for _ in 0..n {
            self.server.cycle();
            self.client.cycle();
        }
    }

    fn count_client(&self, call: HwCall) -> usize {
        self.client_board
            .calls()
            .iter()
            .filter(|c| **c == call)
            .count()
    }
}

#[test]
fn both_idle_until_commanded() {
    let mut pair = Pair::new(CurrentFollower::default());
    assert_eq!(pair.server_board.sync_role().as_deref(), Some("master"));
    assert_eq!(pair.client_board.sync_role().as_deref(), Some("slave:1.1.4"));

    pair.step(50);
    assert_eq!(pair.server.mode(), Mode::Idle);
    assert_eq!(pair.client.mode(), Mode::Idle);
    assert!(pair.server_board.calls().is_empty());
    assert!(pair.client_board.calls().is_empty());
}

#[test]
fn follower_tracks_server_mode_and_gain() {
    let mut pair = Pair::new(CurrentFollower::default());

    pair.server.send(Command::Power).unwrap();
    pair.step(1);
    assert_eq!(pair.server.mode(), Mode::Power);
    assert_eq!(pair.client.mode(), Mode::Power);
    assert!(pair.client_board.pwm_on());
    assert!(pair.client_board.indicator());

    let t = pair.client.shared().snapshot();
    assert!(t.status.phase().is_running());
    assert_eq!(t.i_ref, 2.0);

    pair.server.send(Command::GainUp).unwrap();
    pair.step(1);
    let t = pair.client.shared().snapshot();
    assert!((t.i_ref - 2.2).abs() < 1e-5, "{}", t.i_ref);

    // Console on the follower cannot change its mode
    pair.client.send(Command::Idle).unwrap();
    pair.step(1);
    assert_eq!(pair.client.mode(), Mode::Power);

    pair.server.send(Command::Idle).unwrap();
    pair.step(1);
    assert_eq!(pair.server.mode(), Mode::Idle);
    assert_eq!(pair.client.mode(), Mode::Idle);
    assert!(!pair.client_board.pwm_on());
    assert_eq!(pair.client.shared().snapshot().status.phase(), PhaseCode::Idle);

    // Gain is back to unity on the next run
    pair.server.send(Command::Power).unwrap();
    pair.step(1);
    assert_eq!(pair.client.shared().snapshot().i_ref, 2.0);

    for duty in pair.server_board.calls().iter().filter_map(|c| match c {
        HwCall::SetDuty(d) => Some(*d),
        _ => None,
    }) {
        assert!((0.0..=1.0).contains(&duty), "{duty}");
    }
}

#[test]
fn stopping_is_idempotent() {
    let mut pair = Pair::new(CurrentFollower::default());
    pair.server.send(Command::Power).unwrap();
    pair.step(10);
    pair.server.send(Command::Idle).unwrap();
    pair.step(20);

    assert_eq!(pair.count_client(HwCall::StartAll), 1);
    assert_eq!(pair.count_client(HwCall::StopAll), 1);
    assert_eq!(pair.count_client(HwCall::IndicatorOff), 1);
}

#[test]
fn recorders_restart_together() {
    let mut pair = Pair::new(CurrentFollower::default());

    pair.server.send(Command::Power).unwrap();
    pair.step(9);
    let server_rec = &pair.server.shared().recorder;
    let client_rec = &pair.client.shared().recorder;
    assert_eq!(server_rec.cursor(), 3);
    assert_eq!(client_rec.cursor(), 3);
    assert_eq!(server_rec.get(0).unwrap().i_ref, 2.0);
    assert_eq!(client_rec.get(0).unwrap().i_ref, 2.0);

    // Idle clears the server's recorder; the next run starts both from zero
    pair.server.send(Command::Idle).unwrap();
    pair.step(1);
    assert_eq!(pair.server.shared().recorder.cursor(), 0);

    pair.server.send(Command::Power).unwrap();
    pair.step(8);
    assert_eq!(pair.server.shared().recorder.cursor(), 2);
    assert_eq!(pair.client.shared().recorder.cursor(), 2);
}

#[test]
fn follower_holds_over_on_silent_link() {
    let mut pair = Pair::new(CurrentFollower::default());
    pair.server.send(Command::Power).unwrap();
    pair.step(5);

    pair.wire.sever();
    pair.step(1000);
    assert_eq!(pair.client.mode(), Mode::Power);
    assert!(pair.client_board.pwm_on());
    assert_eq!(pair.client.shared().snapshot().i_ref, 2.0);
}

#[test]
fn follower_drops_to_idle_after_silence_limit() {
    let mut pair = Pair::new(CurrentFollower::default().with_max_silence_cycles(10));
    pair.server.send(Command::Power).unwrap();
    pair.step(5);

    pair.wire.sever();
    pair.step(10);
    assert_eq!(pair.client.mode(), Mode::Power);
    pair.step(1);
    assert_eq!(pair.client.mode(), Mode::Idle);
    assert!(!pair.client_board.pwm_on());

    // Resumes as soon as valid records arrive again
    pair.wire.restore();
    pair.step(1);
    assert_eq!(pair.client.mode(), Mode::Power);
}

#[test]
fn role_selected_by_json_config() {
    let doc = r#"{
        "ctx": { "dt_ns": 100000, "record_every": 2 },
        "role": { "type": "CurrentFollower", "kp": 0.2, "kr": 3000.0, "udc": 40.0,
                  "max_silence_cycles": 3 }
    }"#;
    let controller: Controller = serde_json::from_str(doc).unwrap();
    assert_eq!(controller.ctx.record_every, 2);
    assert_eq!(controller.role.kind(), acsync::RoleKind::CurrentFollower);

    let (link, _peer) = MemoryLink::pair();
    let board = board_with_readings(0.0);
    let node = controller.prepare(io(&board, link)).unwrap();
    assert_eq!(board.sync_role().as_deref(), Some("slave:1.1.4"));
    assert_eq!(node.mode(), Mode::Idle);
}

#[test]
fn stalled_follower_still_sees_server_stop() {
    let mut pair = Pair::new(CurrentFollower::default());
    pair.server.send(Command::Power).unwrap();
    pair.step(1);
    assert_eq!(pair.client.mode(), Mode::Power);

    // Client misses a dozen periods while the server keeps sending
    for _ in 0..12 {
        pair.server.cycle();
    }
    pair.server.send(Command::Idle).unwrap();
    pair.server.cycle();
    assert_eq!(pair.server.mode(), Mode::Idle);
    assert!(pair.client.shared().rx_dropped() > 0);

    // The single idle record sent on the stop transition must win
    pair.client.cycle();
    assert_eq!(pair.client.mode(), Mode::Idle);
    assert!(!pair.client_board.pwm_on());

    pair.step(10);
    assert_eq!(pair.client.mode(), Mode::Idle);
}
