//! lnp-ctl — send one diagnostic request to a running resolver and print
//! the decoded reply.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use lnp_core::{decode_reply, encode_cnam_request, encode_tagged_request, Reply, RequestKind};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(3);

fn print_usage() {
    println!("Usage: lnp-ctl <addr> <db_id> tagged <number>");
    println!("       lnp-ctl <addr> <db_id> cnam <json-payload>");
    println!();
    println!("Examples:");
    println!("  lnp-ctl 127.0.0.1:3307 7 tagged 14155551234");
    println!("  lnp-ctl 127.0.0.1:3307 2 cnam '{{\"number\":\"14155551234\"}}'");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if matches!(args.first().map(String::as_str), Some("help") | Some("--help") | Some("-h")) || args.len() < 4 {
        print_usage();
        if args.is_empty() {
            return Ok(());
        }
        std::process::exit(1);
    }

    let addr: SocketAddr = args[0].parse().context("invalid target address")?;
    let db_id: u8 = args[1].parse().context("db_id must be a number 0-255")?;
    let kind = match args[2].as_str() {
        "tagged" => RequestKind::Tagged,
        "cnam" => RequestKind::Cnam,
        other => bail!("unknown request kind '{other}', expected 'tagged' or 'cnam'"),
    };
    let payload = args[3].as_str();

    let request_id = std::process::id();
    let datagram = match kind {
        RequestKind::Tagged => encode_tagged_request(request_id, db_id, payload),
        RequestKind::Cnam => encode_cnam_request(request_id, db_id, payload),
    };

    let socket = UdpSocket::bind("0.0.0.0:0").await.context("failed to bind local socket")?;
    socket.connect(addr).await.context("failed to connect to target address")?;
    socket.send(&datagram).await.context("failed to send request")?;

    let mut buf = vec![0u8; 65536];

    let provisional_len = timeout(READ_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("timed out waiting for provisional reply")?
        .context("failed to read provisional reply")?;
    println!("provisional: {} bytes, request id {}", provisional_len, u32::from_le_bytes(buf[0..4].try_into().unwrap()));

    let final_len = timeout(READ_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("timed out waiting for final reply")?
        .context("failed to read final reply")?;

    match decode_reply(&buf[..final_len], kind) {
        Some((id, Reply::TaggedSuccess { local_routing_number, local_routing_tag })) => {
            println!("request {id}: ok  lrn={local_routing_number}  tag={local_routing_tag}");
        }
        Some((id, Reply::TaggedError { code, description })) => {
            println!("request {id}: error code={code}  {description}");
        }
        Some((id, Reply::Cnam { body })) => {
            println!("request {id}: {body}");
        }
        None => {
            bail!("could not decode final reply ({final_len} bytes)");
        }
    }

    Ok(())
}
