//! Networking primitives.
//!
//! Goals:
//! - Typed request/response and sync payloads shared by server and clients.
//! - A simple reliable channel with length-prefixed JSON frames.
//! - Keep serialization explicit and versionable.
//!
//! The transport itself is a collaborator; the simulation core only produces
//! and consumes the payload types below.

use anyhow::Context as _;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::math::Vec2;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Room metadata shared with clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomMeta {
    pub id: String,
    pub name: String,
    pub players: Vec<String>,
    pub max_players: u32,
    pub private: bool,
    pub level: String,
}

/// Client -> server: open a new room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRoomRequest {
    pub name: String,
    pub private: bool,
}

/// Client -> server: join an existing room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRoomRequest {
    pub room_id: String,
}

/// Client -> server: raw keyboard state for one input event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerInput {
    pub keys_down: Vec<String>,
    pub keys_pressed: Option<Vec<String>>,
    pub keys_released: Option<Vec<String>>,
}

/// Collider geometry in a client-drawable form, tagged by `form`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum ShapeData {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: bool,
    },
    Arc {
        x: f32,
        y: f32,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
        fill: bool,
    },
    Polygon {
        x: f32,
        y: f32,
        vertices: Vec<(f32, f32)>,
        fill: bool,
    },
}

impl ShapeData {
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        ShapeData::Rect { x, y, width, height, fill: false }
    }

    /// Full circle as an arc.
    pub fn circle(x: f32, y: f32, radius: f32) -> Self {
        ShapeData::Arc {
            x,
            y,
            radius,
            start_angle: 0.0,
            end_angle: std::f32::consts::TAU,
            fill: false,
        }
    }

    pub fn polygon(x: f32, y: f32, vertices: Vec<(f32, f32)>) -> Self {
        ShapeData::Polygon { x, y, vertices, fill: false }
    }
}

/// Per-entity payload of the fast sync path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortEntityData {
    pub id: String,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
}

/// Per-entity payload of the slow/full sync paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityData {
    pub id: String,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub shape: Option<ShapeData>,
    pub color: Option<u32>,
}

/// Fast-tick delta: entities with short-class changes plus removals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShortSync {
    pub updates: Vec<ShortEntityData>,
    pub remove: Vec<String>,
}

/// Slow-tick delta (or full snapshot): long-class changes plus removals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LongSync {
    pub updates: Vec<EntityData>,
    pub remove: Vec<String>,
}

/// Error payload surfaced to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub error: bool,
    pub code: u16,
    pub message: String,
}

/// Client -> server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMsg {
    Hello { protocol: u32 },
    CreateRoom(CreateRoomRequest),
    JoinRoom(JoinRoomRequest),
    GetRooms,
    Input(PlayerInput),
}

/// Server -> client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMsg {
    Welcome { player_id: String },
    RoomCreated { room: RoomMeta },
    RoomJoined { room: RoomMeta },
    Rooms { rooms: Vec<RoomMeta> },
    ShortSync(ShortSync),
    LongSync(LongSync),
    Error(ErrorPayload),
}

/// Reliable connection with length-prefixed JSON frames.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read/write halves.
    pub fn split(self) -> (FramedReader, FramedWriter) {
        let (read, write) = self.stream.into_split();
        (FramedReader { read }, FramedWriter { write })
    }
}

/// Read half of a [`FramedConn`].
#[derive(Debug)]
pub struct FramedReader {
    read: OwnedReadHalf,
}

impl FramedReader {
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        read_frame(&mut self.read).await
    }
}

/// Write half of a [`FramedConn`].
#[derive(Debug)]
pub struct FramedWriter {
    write: OwnedWriteHalf,
}

impl FramedWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.write, msg).await
    }
}

async fn write_frame<W, T>(writer: &mut W, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R, T>(reader: &mut R) -> anyhow::Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    serde_json::from_slice(&payload).context("deserialize msg")
}

/// TCP server listener.
pub struct FramedListener {
    listener: TcpListener,
}

impl FramedListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FramedConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FramedConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(msg).context("serialize")
}

pub fn decode_from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(bytes).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_roundtrip_bytes() {
        let msg = ClientMsg::Hello { protocol: PROTOCOL_VERSION };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back: ClientMsg = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn shape_serializes_with_form_tag() {
        let json = serde_json::to_value(ShapeData::rect(0.0, 1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json["form"], "rect");
        assert_eq!(json["width"], 2.0);

        let json = serde_json::to_value(ShapeData::circle(0.0, 0.0, 5.0)).unwrap();
        assert_eq!(json["form"], "arc");
        assert_eq!(json["start_angle"], 0.0);
    }

    #[test]
    fn error_payload_shape() {
        let json = serde_json::to_value(ErrorPayload {
            error: true,
            code: 409,
            message: "Room is full".to_string(),
        })
        .unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["code"], 409);
        assert_eq!(json["message"], "Room is full");
    }

    #[test]
    fn short_entity_nulls_absent_fields() {
        let json = serde_json::to_value(ShortEntityData {
            id: "p1".to_string(),
            position: Some(Vec2::new(0.0, 0.0)),
            velocity: None,
        })
        .unwrap();
        assert_eq!(json["position"], serde_json::json!([0.0, 0.0]));
        assert_eq!(json["velocity"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn framed_conn_roundtrip() -> anyhow::Result<()> {
        let listener = FramedListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;

        let client = tokio::spawn(async move {
            let mut conn = FramedConn::connect(addr).await?;
            conn.send(&ClientMsg::GetRooms).await?;
            conn.recv::<ServerMsg>().await
        });

        let (mut server_conn, _) = listener.accept().await?;
        let msg: ClientMsg = server_conn.recv().await?;
        assert_eq!(msg, ClientMsg::GetRooms);
        server_conn.send(&ServerMsg::Rooms { rooms: vec![] }).await?;

        let reply = client.await??;
        assert_eq!(reply, ServerMsg::Rooms { rooms: vec![] });
        Ok(())
    }
}
