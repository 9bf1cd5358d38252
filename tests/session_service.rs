//! Session service tests over the in-process socket backend

use pktsock::capture::{MemoryProvider, RawSocketProvider, SentFrame};
use pktsock::config::SessionConfig;
use pktsock::protocol::ProtocolTag;
use pktsock::session::{Mode, Opened, QueueStats, SessionHandle, Status};
use pktsock::Error;

fn dix_frame(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn udp_frame() -> Vec<u8> {
    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    ip[8] = 64;
    ip[9] = 17;
    let mut payload = ip;
    payload.extend_from_slice(&[0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00]);
    dix_frame(0x0800, &payload)
}

fn spawn(max_queue_len: usize) -> (SessionHandle, MemoryProvider) {
    let provider = MemoryProvider::new(["lo", "eth0"]);
    let config = SessionConfig {
        max_queue_len,
        ..Default::default()
    };
    (SessionHandle::spawn(provider.clone(), &config), provider)
}

/// Yield to the service task until it has accounted for `total` frames
async fn settle(handle: &SessionHandle, total: u64) -> QueueStats {
    for _ in 0..1000 {
        let stats = handle.stats().await.unwrap();
        if stats.queue_length as u64 + stats.serviced + stats.dropped >= total {
            return stats;
        }
        tokio::task::yield_now().await;
    }
    panic!("service did not process {} frames", total);
}

#[tokio::test]
async fn test_open_twice_is_already_open() {
    let (handle, provider) = spawn(10);

    assert!(matches!(handle.open(Mode::Passive).await, Ok(Opened::Passive)));
    assert!(matches!(handle.open(Mode::Active).await, Err(Error::AlreadyOpen)));
    assert_eq!(handle.status().await.unwrap(), Status::Open);
    assert_eq!(provider.opened(), 1);
}

#[tokio::test]
async fn test_passive_receive_in_arrival_order() {
    let (handle, provider) = spawn(10);
    handle.open(Mode::Passive).await.unwrap();

    assert!(matches!(handle.receive(5).await, Err(Error::Eagain)));

    let frames: Vec<_> = (0..3u8).map(|i| dix_frame(0x88b5, &[i; 4])).collect();
    for frame in &frames {
        assert!(provider.inject(frame.clone()));
    }
    settle(&handle, 3).await;

    assert_eq!(handle.receive(2).await.unwrap(), frames[..2].to_vec());
    assert_eq!(handle.receive(2).await.unwrap(), frames[2..].to_vec());
    assert!(matches!(handle.receive(1).await, Err(Error::Eagain)));
}

#[tokio::test]
async fn test_full_queue_drops_new_frames() {
    let (handle, provider) = spawn(3);
    handle.open(Mode::Passive).await.unwrap();

    for i in 0..5u8 {
        provider.inject(dix_frame(0x88b5, &[i]));
    }
    let stats = settle(&handle, 5).await;
    assert_eq!(stats.queue_length, 3);
    assert_eq!(stats.max_queue_length, 3);
    assert_eq!(stats.dropped, 2);

    let kept = handle.receive(10).await.unwrap();
    let tags: Vec<u8> = kept.iter().map(|f| f[14]).collect();
    assert_eq!(tags, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_receive_parsed_filters_by_protocol() {
    let (handle, provider) = spawn(10);
    handle.open(Mode::Passive).await.unwrap();

    provider.inject(dix_frame(0x0806, &[0u8; 28]));
    provider.inject(udp_frame());
    provider.inject(dix_frame(0x0806, &[0u8; 28]));
    settle(&handle, 3).await;

    let matched = handle
        .receive_parsed(|f| f.contains(ProtocolTag::Udp), 5)
        .await
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].to_bytes(), udp_frame());

    // Non-matching frames were consumed along the way
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.queue_length, 0);
    assert_eq!(stats.serviced, 3);
}

#[tokio::test]
async fn test_receive_parsed_without_match_drains_queue() {
    let (handle, provider) = spawn(10);
    handle.open(Mode::Passive).await.unwrap();

    for _ in 0..4 {
        provider.inject(dix_frame(0x0806, &[0u8; 28]));
    }
    settle(&handle, 4).await;

    let result = handle
        .receive_parsed(|f| f.contains(ProtocolTag::Tcp), 2)
        .await;
    assert!(matches!(result, Err(Error::Eagain)));
    assert_eq!(handle.stats().await.unwrap().queue_length, 0);
}

#[tokio::test]
async fn test_active_mode_pushes_frames() {
    let (handle, provider) = spawn(10);
    let Ok(Opened::Active(mut frames)) = handle.open(Mode::Active).await else {
        panic!("expected an active session");
    };

    provider.inject(udp_frame());
    provider.inject(dix_frame(0x88b5, b"hello"));

    assert_eq!(frames.recv().await.unwrap(), udp_frame());
    assert_eq!(frames.recv().await.unwrap(), dix_frame(0x88b5, b"hello"));

    assert!(matches!(handle.receive(1).await, Err(Error::Unsupported)));
    assert_eq!(handle.stats().await.unwrap(), QueueStats::default());
}

#[tokio::test]
async fn test_send() {
    let (handle, provider) = spawn(10);

    let frame = dix_frame(0x88b5, b"ping");
    assert!(matches!(
        handle.send("eth0", frame.clone()).await,
        Err(Error::NotConnected)
    ));

    handle.open(Mode::Passive).await.unwrap();
    handle.send("eth0", frame.clone()).await.unwrap();
    assert!(matches!(
        handle.send("eth0", b"abc".to_vec()).await,
        Err(Error::MessageTooShort { len: 3 })
    ));
    assert!(matches!(
        handle.send("wlan0", frame.clone()).await,
        Err(Error::NoSuchInterface { .. })
    ));

    assert_eq!(
        provider.sent(),
        vec![SentFrame {
            interface: "eth0".into(),
            frame,
        }]
    );
}

#[tokio::test]
async fn test_close_then_reopen() {
    let (handle, provider) = spawn(10);

    assert!(matches!(handle.close().await, Err(Error::NotConnected)));

    handle.open(Mode::Passive).await.unwrap();
    provider.inject(dix_frame(0x88b5, &[1]));
    settle(&handle, 1).await;
    handle.close().await.unwrap();

    assert_eq!(handle.status().await.unwrap(), Status::Closed);
    assert!(matches!(handle.receive(1).await, Err(Error::NotConnected)));
    assert!(!provider.inject(dix_frame(0x88b5, &[2])));

    // A fresh open starts with an empty queue
    handle.open(Mode::Passive).await.unwrap();
    assert!(matches!(handle.receive(1).await, Err(Error::Eagain)));
    assert_eq!(provider.opened(), 2);
    assert_eq!(provider.closed(), 1);
}

#[tokio::test]
async fn test_interfaces() {
    let (handle, _provider) = spawn(10);
    assert_eq!(handle.interfaces().await.unwrap(), vec!["lo", "eth0"]);
}

#[tokio::test]
async fn test_dropping_handles_closes_session() {
    let (handle, provider) = spawn(10);
    handle.open(Mode::Passive).await.unwrap();
    drop(handle);

    for _ in 0..1000 {
        if provider.closed() == 1 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("session was not closed after the last handle dropped");
}

#[tokio::test]
async fn test_dead_socket_closes_session() {
    let (handle, provider) = spawn(10);
    handle.open(Mode::Passive).await.unwrap();

    // A second socket takes over the inbound stream; reads on the first now fail
    let _other = provider.clone().open().unwrap();

    for _ in 0..1000 {
        if handle.status().await.unwrap() == Status::Closed {
            assert!(matches!(handle.receive(1).await, Err(Error::NotConnected)));
            assert_eq!(provider.closed(), 1);
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("session stayed open on a dead socket");
}
