//! 集成测试 - 引擎端到端场景
//!
//! 用记录型传输层驱动 `ServBot`，验证命令、排队、DCC 会话与超时的整体行为。

use servbot_core::transfer::protocol::encode_ack;
use servbot_core::{
    ConnectionId, EngineConfig, Event, ListenSocket, ServBot, Transport, TransportError,
};
use std::fs;
use std::net::Ipv4Addr;
use tempfile::TempDir;

#[derive(Default)]
struct MockTransport {
    replies: Vec<(String, String)>,
    offers: Vec<(String, String)>,
    sent: Vec<(ConnectionId, Vec<u8>)>,
    closed_listens: Vec<ConnectionId>,
    disconnected: Vec<ConnectionId>,
    next_id: u64,
}

impl MockTransport {
    fn bytes_to(&self, id: ConnectionId) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|(c, _)| *c == id)
            .flat_map(|(_, b)| b.clone())
            .collect()
    }
}

impl Transport for MockTransport {
    fn join_channel(&mut self, _channel: &str) {}

    fn send_private_message(&mut self, target: &str, text: &str) {
        self.replies.push((target.to_string(), text.to_string()));
    }

    fn send_control_message(&mut self, target: &str, text: &str) {
        self.offers.push((target.to_string(), text.to_string()));
    }

    fn open_listen_socket(&mut self, port: u16) -> Result<ListenSocket, TransportError> {
        self.next_id += 1;
        Ok(ListenSocket {
            id: ConnectionId(self.next_id),
            port,
        })
    }

    fn close_listen_socket(&mut self, id: ConnectionId) {
        self.closed_listens.push(id);
    }

    fn send_bytes(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent.push((id, bytes.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.disconnected.push(id);
    }
}

struct Harness {
    _dir: TempDir,
    bot: ServBot,
    transport: MockTransport,
}

impl Harness {
    /// 根目录包含 a.txt (10 字节) 和 b.txt (5 字节)
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        fs::write(dir.path().join("b.txt"), b"abcde").unwrap();

        let config = EngineConfig::new(
            dir.path(),
            "#files",
            "xdccbot",
            Ipv4Addr::new(192, 168, 1, 2),
            5000,
        );
        let mut bot = ServBot::new(config).unwrap();
        let mut transport = MockTransport::default();
        bot.handle_event(Event::Connected, &mut transport);

        Self {
            _dir: dir,
            bot,
            transport,
        }
    }

    fn say(&mut self, sender: &str, text: &str) -> Vec<String> {
        let before = self.transport.replies.len();
        self.bot.handle_event(
            Event::PrivateMessage {
                sender: sender.to_string(),
                text: text.to_string(),
            },
            &mut self.transport,
        );
        self.transport.replies[before..]
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    fn tick(&mut self) {
        self.bot.tick(&mut self.transport);
    }

    fn event(&mut self, event: Event) {
        self.bot.handle_event(event, &mut self.transport);
    }
}

/// get -> 出队 -> SEND -> 对端接入 -> 一次发送 -> 确认完成
#[test]
fn test_get_transfer_complete_flow() {
    let mut h = Harness::new();

    assert_eq!(h.say("alice!x@y", "\\get a.txt"), vec!["your request has been queued"]);
    assert!(h.transport.replies.iter().all(|(to, _)| to == "alice"));

    h.tick();
    assert_eq!(
        h.transport.offers,
        vec![("alice".to_string(), "SEND a.txt 3232235778 5000 10".to_string())]
    );
    let id = h.bot.scheduler().pending().unwrap().connection;

    h.event(Event::PeerConnected(id));
    assert_eq!(h.transport.bytes_to(id), b"0123456789");
    assert_eq!(h.bot.scheduler().active_sessions(), 1);

    h.event(Event::PeerMessage(id, encode_ack(10).to_vec()));
    assert_eq!(h.bot.scheduler().active_sessions(), 0);
    assert!(h.bot.scheduler().session(id).is_none());
    assert_eq!(h.transport.disconnected, vec![id]);
}

/// 正则只锚定开头
#[test]
fn test_regex_prefix_semantics() {
    let mut h = Harness::new();
    assert_eq!(
        h.say("alice!x@y", "\\regex ^a"),
        vec!["1 matches", "/a.txt - size: 10B"]
    );
    assert_eq!(h.say("alice!x@y", "\\regex txt$"), vec!["0 matches"]);
}

/// 发出一个分块后 60 个 tick 无确认即拆除
#[test]
fn test_idle_session_torn_down() {
    let mut h = Harness::new();
    h.say("alice!x@y", "\\get a.txt");
    h.tick();
    let id = h.bot.scheduler().pending().unwrap().connection;
    h.event(Event::PeerConnected(id));

    for _ in 0..59 {
        h.tick();
    }
    assert!(h.bot.scheduler().session(id).is_some());
    assert!(h.transport.disconnected.is_empty());

    h.tick();
    assert!(h.bot.scheduler().session(id).is_none());
    assert_eq!(h.transport.disconnected, vec![id]);
}

#[test]
fn test_requests_served_last_in_first_out() {
    let mut h = Harness::new();
    h.say("alice!x@y", "\\get a.txt");
    h.tick();
    let first = h.bot.scheduler().pending().unwrap().connection;

    // 第一个请求仍在等待时入队的请求按逆序服务
    h.say("bob!x@y", "\\get a.txt");
    h.say("carol!x@y", "\\get b.txt");
    h.tick();
    assert_eq!(h.transport.offers.len(), 1);

    h.event(Event::PeerConnected(first));
    h.tick();
    assert_eq!(h.transport.offers[1].0, "carol");
    let second = h.bot.scheduler().pending().unwrap().connection;

    h.event(Event::PeerConnected(second));
    h.tick();
    assert_eq!(h.transport.offers[2].0, "bob");
}

#[test]
fn test_dotdot_always_rejected() {
    let mut h = Harness::new();
    for raw in ["../a.txt", "a.txt/..", "..", "/../../etc/passwd", "x..y"] {
        assert_eq!(
            h.say("alice!x@y", &format!("\\get {raw}")),
            vec!["invalid file name"],
            "{raw}"
        );
    }
    h.tick();
    assert!(h.transport.offers.is_empty());
}

#[test]
fn test_search_reports_total_beyond_sample() {
    let mut h = Harness::new();
    for i in 0..7 {
        fs::write(h.bot.catalog().root().join(format!("show-{i}.mkv")), b"x").unwrap();
    }

    let lines = h.say("alice!x@y", "\\find show-");
    assert_eq!(lines[0], "7 matches");
    assert_eq!(lines.len(), 6);

    let lines = h.say("alice!x@y", "\\regex show-\\d");
    assert_eq!(lines[0], "7 matches");
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_full_ack_completes_after_resume() {
    let mut h = Harness::new();
    let content: Vec<u8> = (0..3000u32).map(|i| (i % 200) as u8).collect();
    fs::write(h.bot.catalog().root().join("big.bin"), &content).unwrap();

    h.say("alice!x@y", "\\get big.bin");
    h.tick();
    let id = h.bot.scheduler().pending().unwrap().connection;
    h.event(Event::PeerConnected(id));

    // 首个确认请求从 2500 续传
    h.event(Event::PeerMessage(id, encode_ack(2500).to_vec()));
    let sent = h.transport.bytes_to(id);
    assert_eq!(&sent[1024..], &content[2500..]);

    h.event(Event::PeerMessage(id, encode_ack(3000).to_vec()));
    assert_eq!(h.bot.scheduler().active_sessions(), 0);
}

#[test]
fn test_unanswered_offer_expires_and_next_is_served() {
    let mut h = Harness::new();
    h.say("alice!x@y", "\\get a.txt");
    h.tick();
    let first = h.bot.scheduler().pending().unwrap().connection;
    h.say("bob!x@y", "\\get b.txt");

    for _ in 0..60 {
        h.tick();
    }
    assert_eq!(h.transport.closed_listens, vec![first]);
    assert_eq!(h.transport.offers.len(), 2);
    assert_eq!(h.transport.offers[1].0, "bob");

    // 超时后才接入的对端被拒绝
    h.event(Event::PeerConnected(first));
    assert!(h.transport.disconnected.contains(&first));
    assert_eq!(h.bot.scheduler().active_sessions(), 0);
}

#[test]
fn test_handler_failures_never_escape() {
    let mut h = Harness::new();
    let lines = h.say("alice!x@y", "\\regex [unclosed");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("error: "));

    assert_eq!(h.say("alice!x@y", "\\ping"), vec!["pong"]);
}
