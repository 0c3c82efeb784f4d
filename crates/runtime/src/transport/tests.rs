use std::io::Write as _;

use mdeploy_protocol::{DeviceEvent, DeviceResponse, decode_payload};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use super::*;

async fn read_request(device: &mut DuplexStream) -> Option<DeviceRequest> {
	let mut len_buf = [0u8; 4];
	device.read_exact(&mut len_buf).await.ok()?;
	let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
	device.read_exact(&mut body).await.ok()?;
	Some(serde_json::from_slice(&body).unwrap())
}

async fn write_json(device: &mut DuplexStream, value: serde_json::Value) {
	let bytes = serde_json::to_vec(&value).unwrap();
	device.write_all(&(bytes.len() as u32).to_le_bytes()).await.unwrap();
	device.write_all(&bytes).await.unwrap();
	device.flush().await.unwrap();
}

async fn respond(device: &mut DuplexStream, id: u32, result: serde_json::Value) {
	let response = DeviceResponse {
		id,
		result: Some(result),
		error: None,
	};
	write_json(device, serde_json::to_value(response).unwrap()).await;
}

/// Fake device that stores transferred files and echoes debug data.
async fn run_fake_device(mut device: DuplexStream, os_version: &'static str) -> Vec<u8> {
	let mut stored = Vec::new();
	while let Some(request) = read_request(&mut device).await {
		match request.command {
			DeviceCommand::GetOsVersion => respond(&mut device, request.id, json!({"version": os_version})).await,
			DeviceCommand::BeginFile { overwrite, .. } => {
				assert!(overwrite, "transfers must always overwrite");
				stored.clear();
				respond(&mut device, request.id, json!({})).await;
			}
			DeviceCommand::FileChunk { offset, data } => {
				assert_eq!(offset as usize, stored.len());
				stored.extend(decode_payload(&data).unwrap());
				respond(&mut device, request.id, json!({})).await;
			}
			DeviceCommand::EndFile => {
				let result = json!({"sha256": hex_digest(&stored), "size": stored.len()});
				respond(&mut device, request.id, result).await;
			}
			DeviceCommand::AbortFile => {
				stored.clear();
				respond(&mut device, request.id, json!({})).await;
			}
			DeviceCommand::StartDebugging => respond(&mut device, request.id, json!({})).await,
			DeviceCommand::DebugData { data } => {
				respond(&mut device, request.id, json!({})).await;
				let event = DeviceEvent {
					event: DeviceEvent::DEBUG_DATA.into(),
					params: json!({ "data": data }),
				};
				write_json(&mut device, serde_json::to_value(event).unwrap()).await;
			}
		}
	}
	stored
}

fn binary_file(len: usize) -> tempfile::NamedTempFile {
	let mut file = tempfile::Builder::new().suffix(".dll").tempfile().unwrap();
	let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
	file.write_all(&bytes).unwrap();
	file
}

#[tokio::test]
async fn os_version_round_trip() {
	let (host, device) = duplex(64 * 1024);
	let fake = tokio::spawn(run_fake_device(device, "1.9.0"));

	let mut transport = FramedTransport::new(host);
	assert_eq!(transport.os_version().await.unwrap(), "1.9.0");

	transport.close().await.unwrap();
	drop(transport);
	fake.await.unwrap();
}

#[tokio::test]
async fn deploy_transfers_every_byte_and_verifies() {
	let (host, device) = duplex(64 * 1024);
	let fake = tokio::spawn(run_fake_device(device, "1.9.0"));
	let file = binary_file(TRANSFER_CHUNK_LEN * 2 + 17);

	let mut transport = FramedTransport::new(host);
	transport
		.deploy_application(file.path(), true, &CancellationToken::new())
		.await
		.unwrap();

	transport.close().await.unwrap();
	drop(transport);
	let stored = fake.await.unwrap();
	assert_eq!(stored, std::fs::read(file.path()).unwrap());
}

#[tokio::test]
async fn cancelled_transfer_aborts_and_reports_cancelled() {
	let (host, device) = duplex(64 * 1024);
	let fake = tokio::spawn(run_fake_device(device, "1.9.0"));
	let file = binary_file(TRANSFER_CHUNK_LEN * 4);
	let cancel = CancellationToken::new();
	cancel.cancel();

	let mut transport = FramedTransport::new(host);
	let err = transport.deploy_application(file.path(), true, &cancel).await.unwrap_err();
	assert!(err.is_cancelled(), "unexpected error: {err}");

	transport.close().await.unwrap();
	drop(transport);
	assert!(fake.await.unwrap().is_empty());
}

#[tokio::test]
async fn verification_mismatch_is_protocol_error() {
	let (host, mut device) = duplex(64 * 1024);
	let fake = tokio::spawn(async move {
		while let Some(request) = read_request(&mut device).await {
			let result = match request.command {
				DeviceCommand::EndFile => json!({"sha256": "00", "size": 1}),
				_ => json!({}),
			};
			respond(&mut device, request.id, result).await;
		}
	});
	let file = binary_file(10);

	let mut transport = FramedTransport::new(host);
	let err = transport
		.deploy_application(file.path(), true, &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(err.to_string().contains("verification"), "unexpected error: {err}");

	drop(transport);
	fake.await.unwrap();
}

#[tokio::test]
async fn device_error_payload_surfaces_code() {
	let (host, mut device) = duplex(1024);
	let fake = tokio::spawn(async move {
		let request = read_request(&mut device).await.unwrap();
		write_json(
			&mut device,
			json!({"id": request.id, "error": {"code": "BUSY", "message": "runtime is executing"}}),
		)
		.await;
	});

	let mut transport = FramedTransport::new(host);
	match transport.os_version().await.unwrap_err() {
		Error::Device { code, .. } => assert_eq!(code, "BUSY"),
		other => panic!("expected device error, got {other:?}"),
	}
	fake.await.unwrap();
}

#[tokio::test]
async fn stale_responses_are_skipped() {
	let (host, mut device) = duplex(1024);
	let fake = tokio::spawn(async move {
		let request = read_request(&mut device).await.unwrap();
		respond(&mut device, request.id.wrapping_add(40), json!({"version": "stale"})).await;
		respond(&mut device, request.id, json!({"version": "2.0.1"})).await;
	});

	let mut transport = FramedTransport::new(host);
	assert_eq!(transport.os_version().await.unwrap(), "2.0.1");
	fake.await.unwrap();
}

#[tokio::test]
async fn debug_data_is_echoed_through_event_queue() {
	let (host, device) = duplex(64 * 1024);
	let fake = tokio::spawn(run_fake_device(device, "1.9.0"));

	let mut transport = FramedTransport::new(host);
	transport.start_debugging().await.unwrap();
	transport.debug_write(b"ping").await.unwrap();
	assert_eq!(transport.debug_read().await.unwrap().unwrap(), b"ping");

	transport.close().await.unwrap();
	drop(transport);
	fake.await.unwrap();
}

#[tokio::test]
async fn truncated_frame_is_transport_error() {
	let (host, mut device) = duplex(1024);
	device.write_all(&[0x10, 0x00]).await.unwrap();
	drop(device);

	let mut transport = FramedTransport::new(host);
	let err = transport.debug_read().await.unwrap_err();
	assert!(err.to_string().contains("mid-frame"), "unexpected error: {err}");
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
	let (host, mut device) = duplex(1024);
	device.write_all(&(MAX_FRAME_LEN as u32 + 1).to_le_bytes()).await.unwrap();

	let mut transport = FramedTransport::new(host);
	let err = transport.debug_read().await.unwrap_err();
	assert!(matches!(err, Error::Protocol(_)), "unexpected error: {err}");
}

#[test]
fn hex_digest_matches_known_vector() {
	assert_eq!(
		hex_digest(b"abc"),
		"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
	);
}
