//! End-to-end scenarios driving [`Alligator`] the way a real caller
//! would, one per backend family (spec §8).

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use alligator::{Alligator, FabricConfig};
use buffer::contract::Buffer;
use buffer::endpoint::{Endpoint, NetworkTransport};
use buffer::flags::BackendKind;
use buffer::pin::PinHandle;
use buffer::typed::{set_typed_element, typed_element};
use chain::reserve_with_chain;

fn write_bytes(fabric: &Alligator, id: buffer::id::BufferId, offset: usize, bytes: &[u8]) {
    let buf = fabric.get_buffer(id).expect("buffer still registered");
    for (i, byte) in bytes.iter().enumerate() {
        set_typed_element::<u8>(buf.as_ref(), offset + i, *byte).unwrap();
    }
}

fn grow_heap_chain(
    fabric: &Alligator,
    capacity: usize,
) -> Result<Arc<backend_heap::HeapBuffer>, buffer::error::BufferError> {
    fabric.allocate_heap(capacity).map_err(|err| match err {
        alligator::AlligatorError::Buffer(buffer_err) => buffer_err,
        other => buffer::error::BufferError::OperationFailed(other.to_string()),
    })
}

#[test]
fn heap_allocate_write_read_round_trip() {
    let fabric = Alligator::init(FabricConfig::default());
    let buf = fabric.allocate(BackendKind::Heap, 64).unwrap();
    let id = buf.id();

    write_bytes(&fabric, id, 0, b"hello, alligator");
    let again = fabric.get_buffer(id).unwrap();
    let text: Vec<u8> = (0..16).map(|i| typed_element::<u8>(again.as_ref(), i).unwrap()).collect();
    assert_eq!(&text, b"hello, alligator");

    fabric.shutdown();
}

#[test]
fn pinned_buffer_survives_clear_buffer_until_released() {
    let fabric = Alligator::init(FabricConfig {
        gc_interval: Duration::from_millis(2),
        ..FabricConfig::default()
    });
    let buf = fabric.allocate(BackendKind::Heap, 32).unwrap();
    let id = buf.id();

    let pin = PinHandle::new(Arc::clone(&buf));
    drop(buf);
    fabric.clear_buffer(id).unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(
        fabric.get_buffer(id).is_some(),
        "a pinned buffer must not be reclaimed while the pin is live"
    );

    drop(pin);
    thread::sleep(Duration::from_millis(50));
    assert!(fabric.get_buffer(id).is_none(), "releasing the pin must let the next cycle reclaim it");

    fabric.shutdown();
}

#[test]
fn chain_grows_under_capacity_pressure() {
    let fabric = Alligator::init(FabricConfig::default());
    let head = fabric.allocate_heap(8).unwrap();

    // Three 8-byte reservations against an 8-byte head: the second
    // and third each force a fresh successor link.
    let first = reserve_with_chain(
        &head,
        8,
        |capacity| grow_heap_chain(&fabric, capacity),
        |loser| fabric.clear_buffer(loser.id()).unwrap(),
    )
    .unwrap();
    let second = reserve_with_chain(
        &head,
        8,
        |capacity| grow_heap_chain(&fabric, capacity),
        |loser| fabric.clear_buffer(loser.id()).unwrap(),
    )
    .unwrap();
    let third = reserve_with_chain(
        &head,
        8,
        |capacity| grow_heap_chain(&fabric, capacity),
        |loser| fabric.clear_buffer(loser.id()).unwrap(),
    )
    .unwrap();

    assert_eq!(first.buffer.id(), head.id());
    assert_ne!(second.buffer.id(), head.id());
    assert_ne!(third.buffer.id(), second.buffer.id());
    assert_eq!(third.buffer.id(), head.next_link().get().unwrap().next_link().get().unwrap().id());

    fabric.shutdown();
}

#[test]
fn tcp_echo_round_trip_through_the_facade() {
    let fabric = Alligator::init(FabricConfig::default());

    // The peer plays a plain TCP echo service; the facade only drives
    // the client side of the connection, the role an embedding
    // application actually uses `allocate_network(BackendKind::Tcp, ..)`
    // for (spec §8 scenario 4).
    let peer_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_port = peer_listener.local_addr().unwrap().port();
    let echo_thread = thread::spawn(move || {
        let (mut stream, _addr) = peer_listener.accept().unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&buf).unwrap();
    });

    let client = fabric.allocate_network(BackendKind::Tcp, 64).unwrap();
    client
        .connect(&Endpoint::new("127.0.0.1", peer_port, NetworkTransport::Tcp))
        .unwrap();

    write_bytes(&fabric, client.id(), 0, b"howdy");
    assert_eq!(client.send(0, 5).unwrap(), 5);

    let mut received = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while received == 0 && Instant::now() < deadline {
        received = client.receive(0, 5).unwrap();
    }
    assert_eq!(received, 5);

    let buf = fabric.get_buffer(client.id()).unwrap();
    let echoed: Vec<u8> = (0..5).map(|i| typed_element::<u8>(buf.as_ref(), i).unwrap()).collect();
    assert_eq!(&echoed, b"howdy");

    echo_thread.join().unwrap();
    client.close();
    fabric.shutdown();
}

#[test]
fn shared_memory_attach_round_trips_across_two_handles() {
    let fabric = Alligator::init(FabricConfig::default());

    let creator = fabric.allocate_shared(None, 4096).unwrap();
    let name = creator.name().to_owned();
    write_bytes(&fabric, creator.id(), 0, b"shared-segment");

    let attached = fabric.attach_shared(name, 4096).unwrap();
    let read_back: Vec<u8> = (0..15)
        .map(|i| typed_element::<u8>(attached.as_ref(), i).unwrap())
        .collect();
    assert_eq!(&read_back, b"shared-segment");

    fabric.shutdown();
}

#[test]
fn gpu_upload_download_round_trip() {
    let fabric = Alligator::init(FabricConfig::default());
    let gpu = fabric.allocate_gpu(256, None).unwrap();

    gpu.upload(b"device payload", 0).unwrap();
    let mut out = [0u8; 14];
    gpu.download(&mut out, 0).unwrap();
    assert_eq!(&out, b"device payload");

    fabric.shutdown();
}
