//! Run a voltage source and a current follower in one process, each on a
//! simulated board, connected by an in-process link.
//!
//! By default a short key script drives the server console. Pass
//! `--interactive` to type the keys yourself (end with Ctrl-D).

use std::io::Read;
use std::time::Duration;

use acsync::peripheral::{MockupBoard, PlantModel};
use acsync::socket::ThreadChannelLink;
use acsync::{ConsoleIo, Controller, ControllerCtx, CurrentFollower, NodeIo, VoltageSource};

/// Console input that presses keys on a schedule
struct KeyScript {
    keys: std::vec::IntoIter<(Duration, u8)>,
}

impl Read for KeyScript {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match (self.keys.next(), buf.first_mut()) {
            (Some((delay, key)), Some(slot)) => {
                std::thread::sleep(delay);
                *slot = key;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

fn board_io(board: &MockupBoard, link: ThreadChannelLink) -> NodeIo {
    NodeIo {
        acquisition: Box::new(board.clone()),
        actuation: Box::new(board.clone()),
        link: Box::new(link),
        sync: Box::new(board.clone()),
    }
}

fn main() -> Result<(), String> {
    let interactive = std::env::args().any(|a| a == "--interactive");

    let ctx = ControllerCtx {
        dt_ns: 200_000,
        app_period_ms: 250,
        ..Default::default()
    };
    let plant = PlantModel {
        udc: 40.0,
        load_ohms: 8.0,
    };
    let server_board = MockupBoard::with_plant(plant);
    let client_board = MockupBoard::with_plant(plant);
    let (server_link, client_link) = ThreadChannelLink::pair("server", "client");

    let client = Controller::new(
        ControllerCtx {
            op_name: format!("{}-client", ctx.op_name),
            ..ctx.clone()
        },
        Box::new(CurrentFollower::default()),
    )
    .prepare(board_io(&client_board, client_link))?;
    let server = Controller::new(
        ControllerCtx {
            op_name: format!("{}-server", ctx.op_name),
            ..ctx.clone()
        },
        Box::new(VoltageSource::default()),
    )
    .prepare(board_io(&server_board, server_link))?;

    let server_input: Box<dyn Read + Send> = if interactive {
        Box::new(std::io::stdin())
    } else {
        let ms = Duration::from_millis;
        Box::new(KeyScript {
            keys: vec![
                (ms(0), b'h'),
                (ms(300), b'p'),
                (ms(1000), b'l'),
                (ms(1000), b'l'),
                (ms(1000), b'i'),
                (ms(300), b'\n'),
            ]
            .into_iter(),
        })
    };

    let client = client.run(ConsoleIo {
        input: Box::new(std::io::empty()),
        output: Box::new(std::io::sink()),
        telemetry: Box::new(std::io::sink()),
    })?;
    let server = server.run(ConsoleIo {
        input: server_input,
        output: Box::new(std::io::stdout()),
        telemetry: Box::new(std::io::stdout()),
    })?;

    // Run until the key script or the operator closes the console
    while server.is_running() && !server.console_finished() {
        std::thread::sleep(Duration::from_millis(50));
    }

    println!(
        "server: {} tx failures, {} overruns; client: {} dropped records, mode {}",
        server.shared().tx_failures(),
        server.shared().overruns(),
        client.shared().rx_dropped(),
        client.shared().mode(),
    );

    server.stop()?;
    client.stop()
}
