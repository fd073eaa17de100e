//! Typed clients for the two ports, used by the integration tests and
//! by downstream consumers (the excluded web layer talks this exact
//! protocol).

use futures::{SinkExt, StreamExt};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs},
};
use tokio_util::codec::Framed;

use crate::{
    error::Error,
    framing::JsonLinesCodec,
    protocol::{Notification, Request, Response},
};

/// A client of the request-response port.
pub struct RequestClient {
    framed: Framed<TcpStream, JsonLinesCodec>,
}

impl RequestClient {
    /// Connect to a request-response server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            framed: Framed::new(stream, JsonLinesCodec::new()),
        })
    }

    /// Send a request without waiting for its response.
    pub async fn send(&mut self, request: &Request) -> Result<(), Error> {
        self.framed.send(request).await
    }

    /// Send raw bytes, bypassing request serialization.
    /// The server expects a newline-terminated JSON object per frame;
    /// this lets tests send things which are not.
    pub async fn send_raw(&mut self, line: &str) -> Result<(), Error> {
        let stream = self.framed.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        Ok(())
    }

    /// Receive the next response.
    pub async fn recv(&mut self) -> Result<Response, Error> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or(Error::ConnectionBroken)??;

        serde_json::from_value(frame).map_err(|e| Error::MessageParse(e.to_string()))
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, request: &Request) -> Result<Response, Error> {
        self.send(request).await?;
        self.recv().await
    }
}

/// A subscriber on the notify port.
pub struct NotifyClient {
    framed: Framed<TcpStream, JsonLinesCodec>,
}

impl NotifyClient {
    /// Connect to a notify server. Every notification from now on will
    /// be delivered to this client.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            framed: Framed::new(stream, JsonLinesCodec::new()),
        })
    }

    /// Receive the next notification.
    pub async fn next(&mut self) -> Result<Notification, Error> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or(Error::ConnectionBroken)??;

        serde_json::from_value(frame).map_err(|e| Error::MessageParse(e.to_string()))
    }
}
