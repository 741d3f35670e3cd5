//! Four entities on a line, `n0 -5ms- n1 -5ms- n2 -15ms- n3`, with two
//! flows (`n0 -> n1` and `n3 -> n2`) scheduled through local lists and the
//! inbound-credit rule.
//!
//! Run with `cargo run -p kairos-sim --example four_node_line`.

use std::cell::RefCell;
use std::rc::Rc;

use kairos_sched::{ImpactMatrix, SchedulerConfig, StrategySet};
use kairos_sim::Simulator;
use kairos_types::{Context, NodeId};

const PACKETS: u32 = 5;
const INTERVAL: u64 = 10;
const PACKET_SIZE: u32 = 512;

type Deliveries = Rc<RefCell<Vec<(u32, u32, u64)>>>;

fn send(sim: &mut Simulator, to: u32, link: u64, seq: u32, deliveries: Deliveries) {
    let from = sim.context();
    let sent_at = sim.now();
    let log = Rc::clone(&deliveries);
    sim.schedule_outgoing_transmit(from, Context::node(to), link, PACKET_SIZE, move |sim| {
        println!(
            "{:>4} ms  {} received packet {seq} sent at {sent_at} ms",
            sim.now(),
            sim.context()
        );
        log.borrow_mut().push((to, seq, sim.now().as_u64()));
    });
    if seq + 1 < PACKETS {
        sim.schedule(INTERVAL, move |sim| send(sim, to, link, seq + 1, deliveries));
    }
}

fn main() {
    let node = NodeId::new;
    let latency = ImpactMatrix::from_links(
        4,
        &[(node(0), node(1), 5), (node(1), node(2), 5), (node(2), node(3), 15)],
    );
    let interfaces = vec![
        vec![node(1)],
        vec![node(0), node(2)],
        vec![node(1), node(3)],
        vec![node(2)],
    ];
    let config = SchedulerConfig::new(4)
        .with_impact_latency(latency)
        .with_interfaces(interfaces)
        .with_strategies(StrategySet::all());

    let mut sim = Simulator::new(config).expect("valid configuration");
    let deliveries: Deliveries = Rc::new(RefCell::new(Vec::new()));

    let flow = Rc::clone(&deliveries);
    sim.schedule_with_context(Context::node(0), 0, move |sim| send(sim, 1, 5, 0, flow));
    let flow = Rc::clone(&deliveries);
    sim.schedule_with_context(Context::node(3), 0, move |sim| send(sim, 2, 15, 0, flow));

    let summary = sim.run().expect("run completes");
    println!(
        "{} events, finished at {} ms, {} deadlock fallbacks",
        summary.events_processed, summary.final_time, summary.deadlocks
    );
    println!("{} packets delivered", deliveries.borrow().len());
}
