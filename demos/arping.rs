use async_arping::sim::{Responder, SimArp, SimDevice};
use async_arping::{ArPing, ArPingConfigBuilder, ProbeIdentity};
use clap::Parser;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Ping a simulated host with ARP requests
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address of the host to ping
    #[arg(short, long, default_value = "10.1.1.2")]
    target: Ipv4Addr,
    /// Our own address
    #[arg(short, long, default_value = "10.1.1.1")]
    source: Ipv4Addr,
    /// Stop after this many replies (0 runs until --deadline)
    #[arg(short, long, default_value_t = 4)]
    count: u32,
    /// Seconds between requests
    #[arg(short, long, default_value_t = 1.0)]
    interval: f64,
    /// Payload size in bytes
    #[arg(long, default_value_t = 56)]
    size: usize,
    /// Reply delay of the simulated host, in milliseconds
    #[arg(long, default_value_t = 2)]
    delay_ms: u64,
    /// The simulated host ignores every n-th request (0 never does)
    #[arg(long, default_value_t = 0)]
    drop_every: u64,
    /// Seconds after which the probe is stopped regardless of --count
    #[arg(long, default_value_t = 30.0)]
    deadline: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    // Simulated time: the run completes instantly.
    tokio::time::pause();

    let (device, wire) = SimDevice::new("eth0", MacAddr::new(0x02, 0, 0, 0, 0, 0x01), true);
    let arp = Arc::new(SimArp::new());
    arp.attach(device.clone(), args.source);

    let delay = Duration::from_millis(args.delay_ms);
    let drop_every = args.drop_every;
    let responder = Responder::with_policy(
        args.target,
        MacAddr::new(0x02, 0, 0, 0, 0, 0x02),
        move |n| (drop_every == 0 || (n + 1) % drop_every != 0).then_some(delay),
    );
    tokio::spawn(responder.serve(wire, device.clone()));

    let config = ArPingConfigBuilder::new()
        .with_remote(args.target)
        .with_source_ip(args.source)
        .with_count(args.count)
        .with_interval(Duration::from_secs_f64(args.interval))
        .with_size(args.size)
        .with_identity(ProbeIdentity::new(0, 0))
        .with_verbose(true)
        .build()
        .unwrap();

    let mut arping = ArPing::new(config, device, arp);
    let _deadline = arping
        .stop_handle()
        .stop_after(Duration::from_secs_f64(args.deadline));
    arping.run().await.unwrap();
}
