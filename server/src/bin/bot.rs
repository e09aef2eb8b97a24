//! Headless client that joins the game and wanders at random.
//!
//! Useful for filling the world while testing, e.g.
//! `RUST_LOG=info cargo run --bin bot -- --species fox --name Todd`.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use rand::Rng;
use shared::{MoveInput, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

// Tick frames grow with the player count
const RECV_BUFFER_SIZE: usize = 65_536;
const FRAME_MS: u64 = 50;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3000")]
    server: String,

    /// Display name
    #[arg(short, long, default_value = "Bot")]
    name: String,

    /// "fox" or "rabbit"
    #[arg(long, default_value = "rabbit")]
    species: String,

    /// Stop after this many seconds; runs forever when 0
    #[arg(short, long, default_value = "0")]
    duration_secs: u64,
}

fn random_input(rng: &mut impl Rng) -> MoveInput {
    MoveInput {
        up: rng.gen_bool(0.3),
        down: rng.gen_bool(0.3),
        left: rng.gen_bool(0.3),
        right: rng.gen_bool(0.3),
    }
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server_addr = args.server.parse::<SocketAddr>()?;
    info!("Bot bound to {}, connecting to {}", socket.local_addr()?, server_addr);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
    match deserialize::<Packet>(&buf[..len])? {
        Packet::Hello { client_id, .. } => info!("Connected as client {}", client_id),
        Packet::Disconnected { reason } => {
            warn!("Server refused connection: {}", reason);
            return Ok(());
        }
        other => {
            warn!("Expected Hello but got {:?}", other);
            return Ok(());
        }
    }

    send(
        &socket,
        &Packet::JoinLobby {
            name: args.name.clone(),
            species: args.species.clone(),
        },
        server_addr,
    )
    .await?;

    let mut rng = rand::thread_rng();
    let mut input = random_input(&mut rng);
    let mut frame = interval(Duration::from_millis(FRAME_MS));
    let started = Instant::now();
    let deadline = (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs));

    loop {
        tokio::select! {
            _ = frame.tick() => {
                if deadline.map_or(false, |d| started.elapsed() >= d) {
                    break;
                }
                if rng.gen_bool(0.05) {
                    input = random_input(&mut rng);
                }
                let packet = Packet::Move { input, dt: Some(FRAME_MS as f64) };
                send(&socket, &packet, server_addr).await?;
            }

            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(Packet::EnteredGame { ok, reason, .. }) => {
                        info!("Entered game: ok={} reason={:?}", ok, reason);
                    }
                    Ok(Packet::OutOfEnergy) => {
                        info!("Ran out of energy, waiting for a slot");
                    }
                    Ok(Packet::Eaten) => info!("Eaten, waiting for a slot"),
                    Ok(Packet::Tick { state, hearts, hits }) => {
                        debug!(
                            "Tick: {} foxes, {} rabbits, {} queued, {} hearts, {} hits",
                            state.counts.foxes,
                            state.counts.rabbits,
                            state.queue,
                            hearts.len(),
                            hits.len()
                        );
                    }
                    Ok(Packet::Disconnected { reason }) => {
                        warn!("Disconnected: {}", reason);
                        return Ok(());
                    }
                    Ok(other) => debug!("Received {:?}", other),
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    info!("Bot finished");
    Ok(())
}
