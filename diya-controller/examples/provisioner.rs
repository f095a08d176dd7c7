//! End-to-end demo: scan the local network, bind whatever answers, then
//! push Wi-Fi credentials to everything bound.
//!
//! Run with: cargo run --example provisioner --features async -- <ssid> <password>

use std::time::Duration;

use diya_controller::{BootstrapEngine, DeviceMode, Event, TokioScheduler, UdpTransport, RECEIVE_PORT};
use diya_proto::provision::BootstrapData;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut args = std::env::args().skip(1);
    let ssid = args.next().unwrap_or_else(|| "home-network".to_string());
    let password = args.next().unwrap_or_default();

    let transport = UdpTransport::bind(format!("0.0.0.0:{}", RECEIVE_PORT).parse().unwrap())?;
    let receiver = transport.socket().try_clone()?;
    receiver.set_nonblocking(true)?;
    let receiver = tokio::net::UdpSocket::from_std(receiver)?;

    let (scheduler, mut events) = TokioScheduler::new();
    let mut engine =
        BootstrapEngine::new(transport, scheduler, b"controller-secret", b"bootstrap", &ssid)
            .expect("static keys are valid");
    engine.registry_mut().refresh_app_nonce();

    println!("Scanning for devices...");
    engine.detect_devices(Duration::from_millis(500), 3);
    let mut scan_rounds = 1;

    let mut buf = [0u8; 2048];
    loop {
        tokio::select! {
            received = receiver.recv_from(&mut buf) => {
                let (len, from) = received?;
                engine.parse_packet(&buf[..len], from);
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let detection_done = event == Event::DetectFinished;
                let bootstrap_done = event == Event::BootstrapFinished;
                engine.handle_event(event);

                if detection_done {
                    let total = engine.registry().devices().len();
                    let bound = engine
                        .registry()
                        .devices()
                        .iter()
                        .filter(|d| d.mode() == DeviceMode::Bound)
                        .count();
                    println!("Scan complete: {} device(s) seen, {} bound", total, bound);
                    for device in engine.registry().devices() {
                        let strength = device
                            .wireless_network(engine.registry().own_ssid())
                            .map(|n| n.strength);
                        println!("  {} ({:?}, strength {:?})", device.device_name(), device.mode(), strength);
                    }
                    if bound > 0 {
                        let mut data = BootstrapData::new();
                        data.set_wifi_data(&ssid, &password);
                        println!("Provisioning {} device(s) with {}", bound, ssid);
                        engine.bootstrap_devices(Duration::from_millis(500), 3, data);
                    } else if total > 0 && scan_rounds < 3 {
                        // Freshly bound devices confirm on the next round.
                        scan_rounds += 1;
                        engine.registry_mut().refresh_app_nonce();
                        engine.detect_devices(Duration::from_millis(500), 3);
                    } else {
                        break;
                    }
                }
                if bootstrap_done {
                    println!("Provisioning finished");
                    break;
                }
            }
        }
    }

    Ok(())
}
