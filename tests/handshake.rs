use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};

use rust_ofp13::app::EchoResponder;
use rust_ofp13::ofp_controller::{ControllerConfig, OfpController};
use rust_ofp13::ofp_datapath::{handle_client_connected, ConnState, Datapath};
use rust_ofp13::ofp_dispatch::{Application, Dispatcher, EchoReplyHandler, Registry,
                               SwitchFeaturesHandler};
use rust_ofp13::ofp_header::OfpHeader;
use rust_ofp13::ofp_message::OfpMessage;
use rust_ofp13::openflow0x04::{Message, SwitchFeatures};

const HELLO: [u8; 8] = [0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];

const FEATURES_REPLY: [u8; 32] = [
    0x04, 0x06, 0x00, 0x20, 0x00, 0x00, 0x00, 0x01,
    0, 0, 0, 0, 0, 0, 0, 1,
    0, 0, 1, 0,
    254, 0, 0, 0,
    0, 0, 0, 0x4f,
    0, 0, 0, 0,
];

/// Records features replies and echo replies, and remembers the datapath it saw.
#[derive(Default)]
struct Observer {
    features: AtomicUsize,
    datapath_ids: Mutex<Vec<Option<u64>>>,
    echo_payloads: Mutex<Vec<Vec<u8>>>,
    datapath: Mutex<Option<Arc<Datapath>>>,
}

#[async_trait]
impl SwitchFeaturesHandler for Observer {
    async fn handle_switch_features(&self, _: u32, feats: &SwitchFeatures, dp: &Arc<Datapath>) {
        assert_eq!(dp.state(), ConnState::Established);
        self.features.fetch_add(1, Ordering::SeqCst);
        self.datapath_ids.lock().unwrap().push(Some(feats.datapath_id));
        *self.datapath.lock().unwrap() = Some(dp.clone());
    }
}

#[async_trait]
impl EchoReplyHandler for Observer {
    async fn handle_echo_reply(&self, _: u32, data: &[u8], _: &Arc<Datapath>) {
        self.echo_payloads.lock().unwrap().push(data.to_vec());
    }
}

impl Application for Observer {
    fn name(&self) -> &str {
        "observer"
    }

    fn as_switch_features_handler(&self) -> Option<&dyn SwitchFeaturesHandler> {
        Some(self)
    }

    fn as_echo_reply_handler(&self) -> Option<&dyn EchoReplyHandler> {
        Some(self)
    }
}

async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> (OfpHeader, Vec<u8>) {
    let mut head = [0u8; 8];
    stream.read_exact(&mut head).await.unwrap();
    let header = OfpHeader::parse(&head).unwrap();
    let mut body = vec![0u8; header.length() - OfpHeader::size()];
    stream.read_exact(&mut body).await.unwrap();
    (header, body)
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn connect(observer: Arc<Observer>) -> (DuplexStream, tokio::task::JoinHandle<()>) {
    let registry = Arc::new(Registry::new());
    registry.register(observer);
    registry.register(Arc::new(EchoResponder));
    let dispatcher = Arc::new(Dispatcher::new(registry));
    let (switch, controller) = tokio::io::duplex(4096);
    let task = tokio::spawn(async move {
        let _ = handle_client_connected(controller, peer(), dispatcher, 16).await;
    });
    (switch, task)
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn handshake_sets_datapath_id_and_dispatches_features_once() {
    let observer = Arc::new(Observer::default());
    let (mut switch, _task) = connect(observer.clone());

    let mut first = [0u8; 8];
    switch.read_exact(&mut first).await.unwrap();
    assert_eq!(first, HELLO);

    switch.write_all(&HELLO).await.unwrap();
    let (header, body) = read_message(&mut switch).await;
    assert_eq!(header.version(), 0x04);
    assert_eq!(header.typ(), 5, "features request");
    assert_eq!(header.length(), 8);
    assert!(body.is_empty());
    assert_eq!(observer.features.load(Ordering::SeqCst), 0, "hello is never dispatched");

    switch.write_all(&FEATURES_REPLY).await.unwrap();
    wait_for(|| observer.features.load(Ordering::SeqCst) == 1).await;
    assert_eq!(*observer.datapath_ids.lock().unwrap(), [Some(1)]);
    let dp = observer.datapath.lock().unwrap().clone().unwrap();
    assert_eq!(dp.datapath_id(), Some(1));
    assert_eq!(dp.version(), Some(0x04));
    assert_eq!(dp.state(), ConnState::Established);
}

#[tokio::test]
async fn frames_survive_arbitrary_chunking() {
    let observer = Arc::new(Observer::default());
    let (mut switch, _task) = connect(observer.clone());
    let _ = read_message(&mut switch).await;

    let mut stream = HELLO.to_vec();
    for payload in [&b"one"[..], &b""[..], &b"three"[..]] {
        stream.extend(Message::marshal(9, &Message::EchoReply(payload.to_vec())));
    }
    for chunk in stream.chunks(3) {
        switch.write_all(chunk).await.unwrap();
        switch.flush().await.unwrap();
        tokio::task::yield_now().await;
    }

    wait_for(|| observer.echo_payloads.lock().unwrap().len() == 3).await;
    assert_eq!(*observer.echo_payloads.lock().unwrap(),
               [b"one".to_vec(), vec![], b"three".to_vec()]);
}

#[tokio::test]
async fn sends_reach_the_switch_in_order() {
    let observer = Arc::new(Observer::default());
    let (mut switch, _task) = connect(observer.clone());
    let _ = read_message(&mut switch).await;
    switch.write_all(&HELLO).await.unwrap();
    let _ = read_message(&mut switch).await;
    switch.write_all(&FEATURES_REPLY).await.unwrap();
    wait_for(|| observer.datapath.lock().unwrap().is_some()).await;

    let dp = observer.datapath.lock().unwrap().clone().unwrap();
    let mut xids = vec![];
    for i in 0..5u8 {
        xids.push(dp.send(Message::EchoRequest(vec![i])).await.unwrap());
    }
    for (i, xid) in xids.iter().enumerate() {
        let (header, body) = read_message(&mut switch).await;
        assert_eq!(header.typ(), 2, "echo request");
        assert_eq!(header.xid(), *xid);
        assert_eq!(body, [i as u8]);
    }

    // Echo requests from the switch are answered with the same xid and payload.
    switch.write_all(&Message::marshal(0xbeef, &Message::EchoRequest(b"hi".to_vec())))
        .await
        .unwrap();
    let (header, body) = read_message(&mut switch).await;
    assert_eq!(header.typ(), 3, "echo reply");
    assert_eq!(header.xid(), 0xbeef);
    assert_eq!(body, b"hi");

    dp.close().await;
    let mut rest = vec![];
    switch.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn malformed_messages_do_not_drop_the_connection() {
    let observer = Arc::new(Observer::default());
    let (mut switch, _task) = connect(observer.clone());
    let _ = read_message(&mut switch).await;

    // A truncated features reply body, then an unsupported group-mod, then a good echo reply.
    let mut stream = vec![0x04, 0x06, 0x00, 0x0c, 0, 0, 0, 1, 0, 0, 0, 0];
    stream.extend_from_slice(&[0x04, 15, 0x00, 0x08, 0, 0, 0, 2]);
    stream.extend(Message::marshal(3, &Message::EchoReply(b"ok".to_vec())));
    switch.write_all(&stream).await.unwrap();

    wait_for(|| observer.echo_payloads.lock().unwrap().len() == 1).await;
    assert_eq!(observer.features.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn controller_serves_tcp_switches() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let controller = Arc::new(OfpController::new(ControllerConfig {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        ..ControllerConfig::default()
    }));
    let observer = Arc::new(Observer::default());
    controller.register_application(observer.clone());
    let server = controller.clone();
    tokio::spawn(async move { server.serve(listener).await });

    for expected in 1..=2usize {
        let mut switch = TcpStream::connect(addr).await.unwrap();
        let (header, _) = read_message(&mut switch).await;
        assert_eq!(header.typ(), 0, "hello");
        switch.write_all(&HELLO).await.unwrap();
        let (header, _) = read_message(&mut switch).await;
        assert_eq!(header.typ(), 5, "features request");
        switch.write_all(&FEATURES_REPLY).await.unwrap();
        wait_for(|| observer.features.load(Ordering::SeqCst) == expected).await;
    }
}
