//! One physical controller's persistent TCP session: reconnect loop, the
//! line-framed command encoder, the JSON button decoder, and the front/back
//! LCD diff-commit buffers.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cube_proto::color::Rgb;
use cube_proto::{ControllerConnectError, ControllerIoError, ControllerProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

use crate::prelude::*;

/// LCD character columns.
pub const LCD_COLS: usize = 20;
/// LCD character rows.
pub const LCD_ROWS: usize = 4;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// One of the five physical buttons, in the device's fixed wire order.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Button {
    /// Index 0.
    Up,
    /// Index 1.
    Left,
    /// Index 2.
    Down,
    /// Index 3.
    Right,
    /// Index 4.
    Select,
}

impl Button {
    /// All five buttons, in wire index order.
    pub const ALL: [Button; 5] = [Button::Up, Button::Left, Button::Down, Button::Right, Button::Select];

    fn index(self) -> usize {
        match self {
            Button::Up => 0,
            Button::Left => 1,
            Button::Down => 2,
            Button::Right => 3,
            Button::Select => 4,
        }
    }
}

/// The edge (or steady-state) of a button between two raw frames.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Edge {
    /// The button was not down, and now is.
    Pressed,
    /// The button was down, and now is not.
    Released,
    /// The button is still down.
    Held,
}

/// One button state change (or continuation), tagged with the player role it maps to.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ButtonEdge {
    /// The player role this controller's DIP is mapped to.
    pub player_id: String,
    /// The hardware DIP id this edge originated from.
    pub dip: u16,
    /// Which button changed (or is held).
    pub button: Button,
    /// The edge kind.
    pub edge: Edge,
}

/// Connection lifecycle of a [`ControllerSession`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnectionState {
    /// No TCP connection; a reconnect attempt is pending or in backoff.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and serving reads/writes.
    Connected,
}

/// A 20x4 character buffer, initialized to all spaces.
pub type LcdBuffer = [[u8; LCD_COLS]; LCD_ROWS];

fn blank_lcd() -> LcdBuffer {
    [[b' '; LCD_COLS]; LCD_ROWS]
}

/// Persistent per-controller TCP session state, owned by the reactor thread.
pub struct ControllerSession {
    /// Hardware DIP id.
    pub dip: u16,
    /// Player role this DIP is mapped to (e.g. `"P1"`).
    pub player_id: String,
    ip: String,
    port: u16,
    state: ConnectionState,
    write_half: Option<OwnedWriteHalf>,
    /// What the back buffer believes the device currently displays; `None` means unknown
    /// (forces a full resync on the next commit -- set on every disconnect).
    front_lcd: Option<LcdBuffer>,
    back_lcd: LcdBuffer,
    last_button_state: [bool; 5],
    /// Set when an `enum` request is outstanding, to receive the device's DIP reply.
    pending_enum: Option<AsyncOneshotSender<u16>>,
    /// Set once SELECT transitions to Pressed; cleared on Released.
    select_hold_start: Option<Instant>,
    connected_since: Option<Instant>,
    /// Total lines successfully written to the device.
    pub messages_sent: u64,
    /// Total lines successfully read from the device.
    pub messages_received: u64,
    /// Total connect attempts, successful or not.
    pub connection_attempts: u64,
    /// The most recent connect/IO error, if any.
    pub last_error: Option<String>,
    button_tx: AsyncBoundedSender<ButtonEdge>,
}

impl ControllerSession {
    /// Constructs a new session in the `Disconnected` state. Call [`ControllerSession::run`]
    /// to start its reconnect loop.
    pub fn new(dip: u16, ip: String, port: u16, player_id: String, button_tx: AsyncBoundedSender<ButtonEdge>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            dip,
            player_id,
            ip,
            port,
            state: ConnectionState::Disconnected,
            write_half: None,
            front_lcd: None,
            back_lcd: blank_lcd(),
            last_button_state: [false; 5],
            pending_enum: None,
            select_hold_start: None,
            connected_since: None,
            messages_sent: 0,
            messages_received: 0,
            connection_attempts: 0,
            last_error: None,
            button_tx,
        }))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// How long SELECT has been continuously held, if it is currently held.
    pub fn select_held_for(&self) -> Option<Duration> {
        self.select_hold_start.map(|t| t.elapsed())
    }

    /// Clears any in-progress SELECT hold timer (used when leaving a scene that cares about it).
    pub fn clear_select_hold(&mut self) {
        self.select_hold_start = None;
    }

    /// Writes `text` into the back buffer at `(x,y)`, truncated to fit the row.
    pub fn write_lcd(&mut self, x: usize, y: usize, text: &str) {
        if y >= LCD_ROWS || x >= LCD_COLS {
            return;
        }
        let bytes = text.as_bytes();
        let available = LCD_COLS - x;
        let n = bytes.len().min(available);
        self.back_lcd[y][x..x + n].copy_from_slice(&bytes[..n]);
    }

    /// Resets the back buffer to all spaces.
    pub fn clear_lcd(&mut self) {
        self.back_lcd = blank_lcd();
    }

    /// Runs the reconnect loop forever: connect, restore display state, read
    /// buttons until EOF/error, back off, repeat.
    pub async fn run(session: Rc<RefCell<Self>>, connect_timeout: Duration) {
        loop {
            let (ip, port) = {
                let s = session.borrow();
                (s.ip.clone(), s.port)
            };
            session.borrow_mut().state = ConnectionState::Connecting;
            session.borrow_mut().connection_attempts += 1;

            let connect = tokio::time::timeout(connect_timeout, TcpStream::connect((ip.as_str(), port))).await;
            let stream = match connect {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let error = ControllerConnectError::Io { addr: format!("{ip}:{port}"), reason: e.to_string() };
                    let mut s = session.borrow_mut();
                    s.state = ConnectionState::Disconnected;
                    s.last_error = Some(error.to_string());
                    drop(s);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
                Err(_) => {
                    let error = ControllerConnectError::Timeout { addr: format!("{ip}:{port}"), timeout_ms: connect_timeout.as_millis() as u64 };
                    let mut s = session.borrow_mut();
                    s.state = ConnectionState::Disconnected;
                    s.last_error = Some(error.to_string());
                    drop(s);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            let (mut read_half, write_half) = stream.into_split();
            {
                let mut s = session.borrow_mut();
                s.state = ConnectionState::Connected;
                s.write_half = Some(write_half);
                s.connected_since = Some(Instant::now());
                s.front_lcd = None; // force a full resync below
            }

            Self::commit(&session).await;

            let mut buf = [0u8; 4096];
            let mut pending = Vec::new();
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let error = ControllerIoError::Eof { addr: format!("{ip}:{port}") };
                        session.borrow_mut().last_error = Some(error.to_string());
                        break;
                    }
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        Self::drain_lines(&session, &mut pending);
                    }
                    Err(e) => {
                        let error = ControllerIoError::ReadFailed { addr: format!("{ip}:{port}"), reason: e.to_string() };
                        session.borrow_mut().last_error = Some(error.to_string());
                        break;
                    }
                }
            }

            {
                let mut s = session.borrow_mut();
                s.state = ConnectionState::Disconnected;
                s.write_half = None;
                s.front_lcd = None;
                s.connected_since = None;
            }
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    fn drain_lines(session: &Rc<RefCell<Self>>, pending: &mut Vec<u8>) {
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            let Ok(text) = std::str::from_utf8(line) else {
                tracing::warn!("controller line was not valid UTF-8, dropping");
                continue;
            };
            if text.is_empty() {
                continue;
            }
            Self::handle_line(session, text);
        }
    }

    fn handle_line(session: &Rc<RefCell<Self>>, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                let error = ControllerProtocolError::InvalidJson { reason: e.to_string() };
                tracing::warn!("{error}");
                return;
            }
        };

        session.borrow_mut().messages_received += 1;

        if let Some(dip) = value.get("dip").and_then(|v| v.as_u64()) {
            if value.get("type").and_then(|v| v.as_str()) == Some("controller") {
                let sender = session.borrow_mut().pending_enum.take();
                if let Some(tx) = sender {
                    let _ = tx.send(dip as u16);
                }
                return;
            }
        }

        let Some(buttons) = value.get("buttons").and_then(|v| v.as_array()) else {
            tracing::warn!("{}", ControllerProtocolError::MissingButtons);
            return;
        };
        if buttons.len() != 5 {
            tracing::warn!("{}", ControllerProtocolError::MissingButtons);
            return;
        }
        let mut raw = [false; 5];
        for (i, slot) in raw.iter_mut().enumerate() {
            *slot = buttons[i].as_bool().unwrap_or(false);
        }
        Self::dispatch_button_edges(session, raw);
    }

    fn dispatch_button_edges(session: &Rc<RefCell<Self>>, raw: [bool; 5]) {
        let mut s = session.borrow_mut();
        let dip = s.dip;
        let player_id = s.player_id.clone();
        for &button in &Button::ALL {
            let idx = button.index();
            let was_down = s.last_button_state[idx];
            let is_down = raw[idx];
            let edge = match (was_down, is_down) {
                (false, true) => Some(Edge::Pressed),
                (true, false) => Some(Edge::Released),
                (true, true) => Some(Edge::Held),
                (false, false) => None,
            };
            if button == Button::Select {
                match edge {
                    Some(Edge::Pressed) => s.select_hold_start = Some(Instant::now()),
                    Some(Edge::Released) => s.select_hold_start = None,
                    _ => {}
                }
            }
            if let Some(edge) = edge {
                let _ = s.button_tx.try_send(ButtonEdge { player_id: player_id.clone(), dip, button, edge });
            }
        }
        s.last_button_state = raw;
    }

    async fn send_raw(session: &Rc<RefCell<Self>>, line: &str) {
        let (half, addr) = {
            let mut s = session.borrow_mut();
            (s.write_half.take(), format!("{}:{}", s.ip, s.port))
        };
        let Some(mut half) = half else { return };
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        match half.write_all(&data).await {
            Ok(()) => {
                let mut s = session.borrow_mut();
                s.write_half = Some(half);
                s.messages_sent += 1;
            }
            Err(e) => {
                let error = ControllerIoError::SendFailed { addr, reason: e.to_string() };
                let mut s = session.borrow_mut();
                s.state = ConnectionState::Disconnected;
                s.last_error = Some(error.to_string());
            }
        }
    }

    /// Sends `enum\n` and awaits the device's DIP reply within `timeout`.
    pub async fn enumerate(session: &Rc<RefCell<Self>>, timeout: Duration) -> Option<u16> {
        let (tx, rx) = async_oneshot_channel();
        session.borrow_mut().pending_enum = Some(tx);
        Self::send_raw(session, "enum").await;
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }

    /// Sends `noop\n` for liveness.
    pub async fn send_noop(session: &Rc<RefCell<Self>>) {
        Self::send_raw(session, "noop").await;
    }

    /// Sends `backlight:<b0>:<b1>:...\n`.
    pub async fn send_backlight(session: &Rc<RefCell<Self>>, states: &[bool]) {
        let parts: Vec<&str> = states.iter().map(|&on| if on { "1" } else { "0" }).collect();
        Self::send_raw(session, &format!("backlight:{}", parts.join(":"))).await;
    }

    /// Sends `led:<base64>\n` where the payload is a u16-LE pixel count followed by that many RGB triples.
    pub async fn send_led(session: &Rc<RefCell<Self>>, pixels: &[Rgb]) {
        let mut payload = Vec::with_capacity(2 + pixels.len() * 3);
        payload.extend_from_slice(&(pixels.len() as u16).to_le_bytes());
        for pixel in pixels {
            payload.push(pixel.r);
            payload.push(pixel.g);
            payload.push(pixel.b);
        }
        let encoded = BASE64.encode(payload);
        Self::send_raw(session, &format!("led:{encoded}")).await;
    }

    /// Diffs the back buffer against the believed front buffer and commits the minimal set of
    /// `lcd:*` writes, or `lcd:clear` if the back buffer was cleared.
    pub async fn commit(session: &Rc<RefCell<Self>>) {
        if session.borrow().state != ConnectionState::Connected {
            return;
        }

        let back = session.borrow().back_lcd;
        let front = session.borrow().front_lcd;

        if back == blank_lcd() && front.map(|f| f != blank_lcd()).unwrap_or(true) {
            Self::send_raw(session, "lcd:clear").await;
            session.borrow_mut().front_lcd = Some(back);
            return;
        }

        for y in 0..LCD_ROWS {
            let front_row = front.map(|f| f[y]);
            if front_row == Some(back[y]) {
                continue;
            }
            let (p, diff) = diff_row(front_row, &back[y]);
            let text = std::str::from_utf8(&diff).unwrap_or("").to_string();
            Self::send_raw(session, &format!("lcd:{p}:{y}:{text}")).await;
        }
        session.borrow_mut().front_lcd = Some(back);
    }
}

/// Computes the minimal differing substring between an optional believed
/// front row and the target back row. `None` front means "unknown", which
/// forces a full-row write starting at column 0.
fn diff_row(front: Option<[u8; LCD_COLS]>, back: &[u8; LCD_COLS]) -> (usize, Vec<u8>) {
    let Some(front) = front else {
        return (0, back.to_vec());
    };
    let mut p = 0;
    while p < LCD_COLS && front[p] == back[p] {
        p += 1;
    }
    let mut s = 0;
    while s < LCD_COLS - p && front[LCD_COLS - 1 - s] == back[LCD_COLS - 1 - s] {
        s += 1;
    }
    let end = LCD_COLS - s;
    (p, back[p..end].to_vec())
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(text: &str) -> [u8; LCD_COLS] {
        let mut r = [b' '; LCD_COLS];
        let bytes = text.as_bytes();
        r[..bytes.len()].copy_from_slice(bytes);
        r
    }

    #[test]
    fn diff_row_from_unknown_front_is_a_full_write() {
        let (p, diff) = diff_row(None, &row("ABCDEFGH"));
        assert_eq!(p, 0);
        assert_eq!(diff, row("ABCDEFGH").to_vec());
    }

    #[test]
    fn diff_row_matches_scenario_c_first_commit() {
        let (p, diff) = diff_row(Some(row("")), &row("ABCDEFGH"));
        assert_eq!(p, 0);
        assert_eq!(std::str::from_utf8(&diff).unwrap(), "ABCDEFGH");
    }

    #[test]
    fn diff_row_matches_scenario_c_second_commit() {
        let (p, diff) = diff_row(Some(row("ABCDEFGH")), &row("ABCDEFGG"));
        assert_eq!(p, 7);
        assert_eq!(std::str::from_utf8(&diff).unwrap(), "G");
    }

    #[test]
    fn diff_row_leading_char_change() {
        let (p, diff) = diff_row(Some(row("IJKLMNOP")), &row("JJKLMNOP"));
        assert_eq!(p, 0);
        assert_eq!(std::str::from_utf8(&diff).unwrap(), "J");
    }

    #[test]
    fn button_edges_derive_pressed_then_held_then_released() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let session = ControllerSession::new(0, "127.0.0.1".into(), 51333, "P1".into(), tx);
        ControllerSession::dispatch_button_edges(&session, [true, false, false, false, false]);
        let edge = rx.try_recv().unwrap();
        assert_eq!(edge.button, Button::Up);
        assert_eq!(edge.edge, Edge::Pressed);

        ControllerSession::dispatch_button_edges(&session, [true, false, false, false, false]);
        let edge = rx.try_recv().unwrap();
        assert_eq!(edge.edge, Edge::Held);

        ControllerSession::dispatch_button_edges(&session, [false, false, false, false, false]);
        let edge = rx.try_recv().unwrap();
        assert_eq!(edge.edge, Edge::Released);
    }

    #[test]
    fn select_hold_start_tracks_press_and_release() {
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let session = ControllerSession::new(0, "127.0.0.1".into(), 51333, "P1".into(), tx);
        ControllerSession::dispatch_button_edges(&session, [false, false, false, false, true]);
        assert!(session.borrow().select_held_for().is_some());
        ControllerSession::dispatch_button_edges(&session, [false, false, false, false, false]);
        assert!(session.borrow().select_held_for().is_none());
    }
}
