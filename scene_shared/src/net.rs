//! Networking primitives.
//!
//! One bidirectional channel per client: a TCP stream carrying
//! length-prefixed (u32, big endian) UTF-8 frames, one envelope per frame.
//! The server splits each connection into a reader and a writer half so
//! inbound and outbound traffic never wait on each other.

use std::net::SocketAddr;

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time,
};

/// Frames above this size are refused.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, text: &str) -> anyhow::Result<()> {
    anyhow::ensure!(text.len() <= MAX_FRAME_LEN, "frame too large: {}", text.len());
    let mut buf = BytesMut::with_capacity(4 + text.len());
    buf.put_u32(text.len() as u32);
    buf.extend_from_slice(text.as_bytes());
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one frame. `Ok(None)` means the peer closed the stream cleanly.
async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Option<String>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len}");
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    let text = String::from_utf8(payload).context("frame is not utf-8")?;
    Ok(Some(text))
}

/// Framed text connection over TCP.
#[derive(Debug)]
pub struct FrameConn {
    stream: TcpStream,
}

impl FrameConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        write_frame(&mut self.stream, text).await
    }

    pub async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
        read_frame(&mut self.stream).await
    }

    /// Receives a frame within the given timeout. `Ok(None)` on timeout.
    pub async fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<String>> {
        match time::timeout(timeout, read_frame(&mut self.stream)).await {
            Ok(res) => res,
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { half: r }, FrameWriter { half: w })
    }
}

/// Inbound half of a [`FrameConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
        read_frame(&mut self.half).await
    }
}

/// Outbound half of a [`FrameConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        write_frame(&mut self.half, text).await
    }
}

/// TCP server listener.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FrameConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FrameConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn frames_roundtrip_and_close_cleanly() -> anyhow::Result<()> {
        let listener =
            FrameListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (conn, _) = listener.accept().await?;
            let (mut reader, mut writer) = conn.into_split();
            while let Some(text) = reader.recv_text().await? {
                writer.send_text(&text.to_uppercase()).await?;
            }
            Ok::<_, anyhow::Error>(())
        });

        let mut client = FrameConn::connect(addr).await?;
        client.send_text("hello").await?;
        client.send_text("").await?;
        assert_eq!(client.recv_text().await?.as_deref(), Some("HELLO"));
        assert_eq!(client.recv_text().await?.as_deref(), Some(""));
        drop(client);

        server.await??;
        Ok(())
    }
}
