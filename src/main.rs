extern crate clap;
#[macro_use]
extern crate log;
extern crate oath2;
extern crate simple_logger;

use std::sync::Arc;

use clap::{App, Arg};

use oath2::ctl::command;
use oath2::ctl::Controller;
use oath2::ds;
use oath2::event::{Disposition, Event};

fn main() {
    let matches = App::new("oath2-controller")
        .version("0.1.0")
        .about("OpenFlow controller core: handshake, event dispatch and per-switch config management")
        .arg(
            Arg::with_name("listen")
                .long("listen")
                .short("l")
                .value_name("ADDR:PORT")
                .help("address to accept switch connections on")
                .default_value("0.0.0.0:6653")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level).expect("could not init logger");

    let listen_addr = matches.value_of("listen").unwrap().to_string();
    let controller = Controller::new();
    let registry = controller.registry();

    let result = controller.run(listen_addr.clone(), move |bus| {
        install_hub_handler(bus, registry.clone());
    });

    if let Err(e) = result {
        error!("controller exited: {}", e);
        std::process::exit(1);
    }
}

/// a minimal learning-free hub: every `PacketIn` is flooded back out.
/// demonstrates the handler-registration surface the core exposes;
/// a real deployment would register routing/topology handlers here instead.
fn install_hub_handler(bus: &Arc<oath2::event::EventBus>, registry: Arc<oath2::registry::Registry>) {
    bus.register_handler("packet-in", 0, move |event| {
        if let Event::PacketIn { dpid, packet_in } = event {
            let flood = ds::actions::ActionHeader::Output {
                port: ds::ports::PortNumber::Reserved(ds::ports::PortNo::Flood),
                max_len: 0,
            };
            let packet_out = ds::packet_out::PacketOut::new(
                packet_in.buffer_id,
                packet_in.in_port,
                vec![flood],
                packet_in.data.clone(),
            );
            let rc = command::send_openflow_packet_out(&registry, *dpid, packet_out, false);
            if rc != 0 {
                warn!("packet-out to {} failed with errno {}", dpid, rc);
            }
        }
        Disposition::Continue
    });
}
