//! End-to-end tests over real sockets: a server bound to an ephemeral port,
//! a hand-rolled client speaking FTP on the control connection.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use ferric_ftp_server::config::UserConfig;
use ferric_ftp_server::{Server, ServerConfig};

fn temp_home(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ferric-e2e-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("docs")).unwrap();
    std::fs::write(dir.join("hello.txt"), b"hello world\n").unwrap();
    dir
}

fn base_config(home: &Path, pasv_min: u16, pasv_max: u16) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".into(),
        control_port: 0,
        data_port_min: pasv_min,
        data_port_max: pasv_max,
        users: vec![
            UserConfig {
                username: "user".into(),
                password: "user".into(),
                home_dir: home.to_string_lossy().into_owned(),
                permissions: "elradfmwMT".into(),
            },
            UserConfig {
                username: "reader".into(),
                password: "reader".into(),
                home_dir: home.to_string_lossy().into_owned(),
                permissions: "elr".into(),
            },
        ],
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> SocketAddr {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run_until(std::future::pending()));
    addr
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connects and consumes the 220 greeting.
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer,
        };
        let greeting = client.read_reply().await;
        assert!(greeting.starts_with("220 "), "greeting: {greeting}");
        client
    }

    async fn read_reply(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert!(n > 0, "server closed the connection");
        line.trim_end().to_string()
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn cmd(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_reply().await
    }

    async fn login(&mut self, user: &str, pass: &str) {
        let reply = self.cmd(&format!("USER {user}")).await;
        assert!(reply.starts_with("331 "), "USER: {reply}");
        let reply = self.cmd(&format!("PASS {pass}")).await;
        assert!(reply.starts_with("230 "), "PASS: {reply}");
    }

    /// Issues PASV and connects to the advertised address.
    async fn open_passive(&mut self) -> TcpStream {
        let reply = self.cmd("PASV").await;
        assert!(reply.starts_with("227 "), "PASV: {reply}");
        TcpStream::connect(parse_pasv(&reply)).await.unwrap()
    }
}

/// Extracts the data address from a `227 Entering Passive Mode (...)` reply.
fn parse_pasv(reply: &str) -> SocketAddr {
    let open = reply.find('(').unwrap();
    let close = reply.find(')').unwrap();
    let fields: Vec<u16> = reply[open + 1..close]
        .split(',')
        .map(|f| f.parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 6);
    let ip = format!("{}.{}.{}.{}", fields[0], fields[1], fields[2], fields[3]);
    format!("{}:{}", ip, (fields[4] << 8) | fields[5])
        .parse()
        .unwrap()
}

async fn read_to_end(mut data: TcpStream) -> Vec<u8> {
    let mut payload = Vec::new();
    data.read_to_end(&mut payload).await.unwrap();
    payload
}

#[tokio::test]
async fn login_succeeds_and_quit_closes() {
    let home = temp_home("login");
    let addr = start_server(base_config(&home, 42000, 42002)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;
    let reply = client.cmd("QUIT").await;
    assert!(reply.starts_with("221 "));
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn bad_credentials_are_rejected_then_retry_works() {
    let home = temp_home("badcred");
    let addr = start_server(base_config(&home, 42010, 42012)).await;

    let mut client = Client::connect(addr).await;
    assert!(client.cmd("USER user").await.starts_with("331 "));
    assert!(client.cmd("PASS wrong").await.starts_with("530 "));
    // Commands needing auth are still refused.
    assert!(client.cmd("PWD").await.starts_with("530 "));
    client.login("user", "user").await;
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn unknown_and_preauth_commands() {
    let home = temp_home("preauth");
    let addr = start_server(base_config(&home, 42020, 42022)).await;

    let mut client = Client::connect(addr).await;
    assert!(client.cmd("SYST").await.starts_with("215 "));
    assert!(client.cmd("NOOP").await.starts_with("200 "));
    assert!(client.cmd("EPSV").await.starts_with("500 "));
    assert!(client.cmd("LIST").await.starts_with("530 "));
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn passive_list_returns_directory_entries() {
    let home = temp_home("list");
    let addr = start_server(base_config(&home, 42030, 42032)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;

    let data = client.open_passive().await;
    client.send("LIST").await;
    assert!(client.read_reply().await.starts_with("150 "));
    let listing = String::from_utf8(read_to_end(data).await).unwrap();
    assert!(client.read_reply().await.starts_with("226 "));

    assert!(listing.contains("hello.txt"), "listing: {listing}");
    assert!(listing.contains("docs"), "listing: {listing}");
    assert!(listing.lines().any(|l| l.starts_with('d')), "listing: {listing}");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn binary_stor_and_retr_round_trip() {
    let home = temp_home("roundtrip");
    let addr = start_server(base_config(&home, 42040, 42042)).await;
    let payload = b"\x00\x01binary\r\npayload\n\xff".to_vec();

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;
    assert!(client.cmd("TYPE I").await.starts_with("200 "));

    let mut data = client.open_passive().await;
    client.send("STOR upload.bin").await;
    assert!(client.read_reply().await.starts_with("150 "));
    data.write_all(&payload).await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    assert!(client.read_reply().await.starts_with("226 "));
    assert_eq!(std::fs::read(home.join("upload.bin")).unwrap(), payload);

    let data = client.open_passive().await;
    client.send("RETR upload.bin").await;
    assert!(client.read_reply().await.starts_with("150 "));
    let downloaded = read_to_end(data).await;
    assert!(client.read_reply().await.starts_with("226 "));
    assert_eq!(downloaded, payload);
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn ascii_retr_normalizes_line_endings() {
    let home = temp_home("ascii");
    let addr = start_server(base_config(&home, 42050, 42052)).await;
    std::fs::write(home.join("lines.txt"), b"one\ntwo\nthree").unwrap();

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;
    assert!(client.cmd("TYPE A").await.starts_with("200 "));

    let data = client.open_passive().await;
    client.send("RETR lines.txt").await;
    assert!(client.read_reply().await.starts_with("150 "));
    let downloaded = read_to_end(data).await;
    assert!(client.read_reply().await.starts_with("226 "));
    assert_eq!(downloaded, b"one\r\ntwo\r\nthree");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn read_only_user_cannot_store() {
    let home = temp_home("readonly");
    let addr = start_server(base_config(&home, 42060, 42062)).await;

    let mut client = Client::connect(addr).await;
    client.login("reader", "reader").await;
    assert!(client.cmd("STOR new.txt").await.starts_with("550 "));
    assert!(!home.join("new.txt").exists());

    // List and read bits still work.
    let data = client.open_passive().await;
    client.send("NLST").await;
    assert!(client.read_reply().await.starts_with("150 "));
    let names = String::from_utf8(read_to_end(data).await).unwrap();
    assert!(client.read_reply().await.starts_with("226 "));
    assert!(names.contains("hello.txt"));
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn path_traversal_is_contained() {
    let home = temp_home("traversal");
    let addr = start_server(base_config(&home, 42070, 42072)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;
    assert!(client.cmd("RETR ../../etc/passwd").await.starts_with("550 "));
    assert!(client.cmd("CWD ../../..").await.starts_with("550 "));
    // Still rooted at the virtual root.
    let reply = client.cmd("PWD").await;
    assert!(reply.contains("\"/\""), "PWD: {reply}");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn directory_lifecycle_and_rename() {
    let home = temp_home("lifecycle");
    let addr = start_server(base_config(&home, 42080, 42082)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;

    assert!(client.cmd("MKD staging").await.starts_with("257 "));
    assert!(client.cmd("CWD staging").await.starts_with("250 "));
    assert!(client.cmd("PWD").await.contains("\"/staging\""));
    assert!(client.cmd("CDUP").await.starts_with("250 "));

    assert!(client.cmd("RNFR hello.txt").await.starts_with("350 "));
    assert!(client.cmd("RNTO staging/hello.txt").await.starts_with("250 "));
    assert!(home.join("staging/hello.txt").exists());

    assert!(client.cmd("DELE staging/hello.txt").await.starts_with("250 "));
    assert!(client.cmd("RMD staging").await.starts_with("250 "));
    assert!(!home.join("staging").exists());
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn size_and_mdtm_follow_mfmt() {
    let home = temp_home("metadata");
    let addr = start_server(base_config(&home, 42090, 42092)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;

    assert_eq!(client.cmd("SIZE hello.txt").await, "213 12");
    assert!(
        client
            .cmd("MFMT 20230615120000 hello.txt")
            .await
            .starts_with("213 Modify=20230615120000;")
    );
    assert_eq!(client.cmd("MDTM hello.txt").await, "213 20230615120000");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn passive_pool_exhaustion_yields_425() {
    let home = temp_home("exhaust");
    // Single passive port.
    let addr = start_server(base_config(&home, 42100, 42100)).await;

    let mut first = Client::connect(addr).await;
    first.login("user", "user").await;
    assert!(first.cmd("PASV").await.starts_with("227 "));

    let mut second = Client::connect(addr).await;
    second.login("user", "user").await;
    assert!(second.cmd("PASV").await.starts_with("425 "));

    // Releasing the first reservation frees the port for the second session.
    assert!(first.cmd("QUIT").await.starts_with("221 "));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(second.cmd("PASV").await.starts_with("227 "));
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn session_limit_turns_clients_away() {
    let home = temp_home("limit");
    let mut config = base_config(&home, 42110, 42112);
    config.max_sessions = 1;
    let addr = start_server(config).await;

    let _first = Client::connect(addr).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("421 "), "got: {line}");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn active_mode_transfer_with_port() {
    let home = temp_home("active");
    let addr = start_server(base_config(&home, 42120, 42122)).await;

    let mut client = Client::connect(addr).await;
    client.login("user", "user").await;
    assert!(client.cmd("TYPE I").await.starts_with("200 "));

    // Client-side listener the server dials into.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let arg = format!("127,0,0,1,{},{}", port >> 8, port & 0xff);
    assert!(client.cmd(&format!("PORT {arg}")).await.starts_with("200 "));

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    client.send("RETR hello.txt").await;
    assert!(client.read_reply().await.starts_with("150 "));
    let data = accept.await.unwrap();
    let downloaded = read_to_end(data).await;
    assert!(client.read_reply().await.starts_with("226 "));
    assert_eq!(downloaded, b"hello world\n");
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn idle_session_is_timed_out_without_disturbing_others() {
    let home = temp_home("idle");
    let mut config = base_config(&home, 42130, 42132);
    config.idle_timeout_secs = 1;
    let addr = start_server(config).await;

    let mut idle = Client::connect(addr).await;
    let mut busy = Client::connect(addr).await;
    busy.login("user", "user").await;

    // The first session goes quiet; keep the second one chatting until the
    // idle one has been closed.
    let timed_out = tokio::spawn(async move { idle.read_reply().await });
    while !timed_out.is_finished() {
        assert!(busy.cmd("NOOP").await.starts_with("200 "));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let reply = timed_out.await.unwrap();
    assert!(reply.starts_with("421 "), "got: {reply}");

    // The surviving session is fully functional.
    assert!(busy.cmd("PWD").await.starts_with("257 "));
    assert!(busy.cmd("QUIT").await.starts_with("221 "));
    std::fs::remove_dir_all(&home).unwrap();
}

#[tokio::test]
async fn oversized_command_line_is_bounded_and_resyncs() {
    let home = temp_home("oversize");
    let mut config = base_config(&home, 42140, 42142);
    config.max_command_length = 64;
    let addr = start_server(config).await;

    let mut client = Client::connect(addr).await;

    // Stream far more than the limit without ever sending a newline; the
    // rejection must arrive anyway, proving the server is not buffering the
    // line until it terminates.
    let junk = vec![b'a'; 1 << 20];
    client.writer.write_all(&junk).await.unwrap();
    let reply = client.read_reply().await;
    assert!(reply.starts_with("500 "), "got: {reply}");

    // Terminate the junk line; the next command parses cleanly.
    client.writer.write_all(b"\r\n").await.unwrap();
    assert!(client.cmd("NOOP").await.starts_with("200 "));

    // Strikes two and three close the connection.
    let long_line = format!("{}\r\n", "b".repeat(100));
    client.writer.write_all(long_line.as_bytes()).await.unwrap();
    assert!(client.read_reply().await.starts_with("500 "));
    client.writer.write_all(long_line.as_bytes()).await.unwrap();
    assert!(client.read_reply().await.starts_with("500 "));

    let mut line = String::new();
    let n = client.reader.read_line(&mut line).await.unwrap();
    assert_eq!(n, 0, "connection should be closed after the third strike");
    std::fs::remove_dir_all(&home).unwrap();
}
