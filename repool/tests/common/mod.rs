//! An in-process mock of the remote store, good enough to exercise the
//! pool: it speaks just the slice of RESP2 the driver sends and records
//! what it saw.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// How the mock reacts to clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBehavior {
    /// Reject every `AUTH` with `-ERR invalid password`.
    pub reject_auth: bool,
    /// Read commands but never reply.
    pub silent: bool,
}

/// A mock server listening on an ephemeral local port.
pub struct MockRedis {
    address: String,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockRedis {
    /// Binds to an ephemeral port and starts accepting clients.
    pub async fn spawn(behavior: MockBehavior) -> MockRedis {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let accepted_in_loop = Arc::clone(&accepted);
        let commands_in_loop = Arc::clone(&commands);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                accepted_in_loop.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, behavior, Arc::clone(&commands_in_loop)));
            }
        });

        MockRedis {
            address,
            accepted,
            commands,
        }
    }

    /// `host:port` the mock listens on.
    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Uppercased names of all commands received, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Waits until at least `n` connections were accepted.
    ///
    /// The kernel completes a client's connect before our accept loop runs,
    /// so tests must not read `accepted()` immediately after a `get`.
    pub async fn wait_accepted(&self, n: usize) {
        for _ in 0..200 {
            if self.accepted() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock never accepted {n} connections (got {})", self.accepted());
    }
}

async fn serve(socket: TcpStream, behavior: MockBehavior, commands: Arc<Mutex<Vec<String>>>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let Some(args) = read_command(&mut reader).await else {
            return;
        };
        let name = args
            .first()
            .map(|a| a.to_ascii_uppercase())
            .unwrap_or_default();
        commands.lock().unwrap().push(name.clone());

        if behavior.silent {
            continue;
        }

        let reply: &[u8] = match name.as_str() {
            "AUTH" => {
                if behavior.reject_auth {
                    b"-ERR invalid password\r\n"
                } else {
                    b"+OK\r\n"
                }
            }
            "PING" => b"+PONG\r\n",
            "INCR" | "INCRBY" => b":1\r\n",
            "GET" => b"$3\r\nfoo\r\n",
            _ => b"-ERR unknown command\r\n",
        };
        if write_half.write_all(reply).await.is_err() {
            return;
        }
    }
}

/// Reads one `*N` array-of-bulk-strings command; `None` on EOF or junk.
async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_line = String::new();
        reader.read_line(&mut len_line).await.ok()?;
        let len: usize = len_line.trim_end().strip_prefix('$')?.parse().ok()?;

        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8_lossy(&data).into_owned());
    }
    Some(args)
}
