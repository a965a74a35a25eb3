mod config;
mod networking;

pub use config::{NetworkConfig, NetworkPartyConfig};
pub use networking::{connect_peer, NetChannel};

use std::time::Duration;

use futures::{
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, Stream, StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;

use crate::Party;

/// Largest accepted frame. Input masks of a whole study travel in a single frame.
const MAX_FRAME_LENGTH: usize = 1 << 30;

/// Error type for channels.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("error while sending message to {0}")]
    Send(Party),
    #[error("error while receiving message from {0}")]
    Recv(Party),
    #[error("connection to {0} closed")]
    Closed(Party),
    #[error("no message from {0} within {1:?}")]
    Timeout(Party, Duration),
}

/// Connection to the other participant of a two-party protocol.
pub struct PeerTransport<T, Channel> {
    sink: SplitSink<Channel, T>,
    stream: SplitStream<Channel>,
    party: Party,
    receive_timeout: Option<Duration>,
}

impl<T, Channel> PeerTransport<T, Channel>
where
    Channel: Stream + Sink<T>,
{
    /// Wrap connection of `party` to its peer.
    pub fn new(channel: Channel, party: Party) -> Self {
        // We split the channel into unidirectional halves. This allows us to
        // send and receive concurrently without bothering borrow checker.
        let (sink, stream) = channel.split();
        Self {
            sink,
            stream,
            party,
            receive_timeout: None,
        }
    }

    /// Fail receives that wait for the peer longer than `limit`.
    pub fn with_receive_timeout(mut self, limit: Duration) -> Self {
        self.receive_timeout = Some(limit);
        self
    }
}

impl<T, Channel> PeerTransport<T, Channel> {
    /// Role of the current party.
    pub fn party(&self) -> Party {
        self.party
    }

    /// Role of the party on the other end.
    pub fn peer(&self) -> Party {
        self.party.peer()
    }
}

impl<T, E, Channel> PeerTransport<T, Channel>
where
    T: Unpin,
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    /// Send message to peer.
    pub async fn send(&mut self, msg: T) -> Result<(), TransportError> {
        let peer = self.peer();
        self.sink
            .send(msg)
            .await
            .map_err(|_| TransportError::Send(peer))
    }

    /// Receive message from peer.
    pub async fn receive(&mut self) -> Result<T, TransportError> {
        let peer = self.peer();
        receive_from(&mut self.stream, peer, self.receive_timeout).await
    }

    /// Concurrently send a message to peer and receive one from it.
    pub async fn exchange(&mut self, msg: T) -> Result<T, TransportError> {
        let peer = self.peer();
        let sink = &mut self.sink;
        let stream = &mut self.stream;
        let send = async move { sink.send(msg).await.map_err(|_| TransportError::Send(peer)) };
        let receive = receive_from(stream, peer, self.receive_timeout);
        let (_, received) = futures::try_join!(send, receive)?;
        Ok(received)
    }
}

async fn receive_from<T, E, S>(
    stream: &mut S,
    peer: Party,
    limit: Option<Duration>,
) -> Result<T, TransportError>
where
    S: Stream<Item = Result<T, E>> + Unpin,
{
    let next = match limit {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| TransportError::Timeout(peer, limit))?,
        None => stream.next().await,
    };
    match next {
        Some(Ok(msg)) => Ok(msg),
        Some(Err(_)) => Err(TransportError::Recv(peer)),
        None => Err(TransportError::Closed(peer)),
    }
}

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// Length-framed Bincode-encoded tokio's Duplex stream.
pub type BincodeDuplex<T> = BincodeStreamSink<T, DuplexStream>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_channel_with_bincode<T, C>(channel: C) -> BincodeStreamSink<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    let length_delimited = tokio_util::codec::Framed::new(channel, codec);
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create bidirectional Bincode-encoded channel.
pub fn bincode_duplex<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_channel_with_bincode(a), wrap_channel_with_bincode(b))
}

/// Create in-process transports of the first and the second party for testing.
#[allow(clippy::type_complexity)]
pub fn mock_peer_transports<T>(
    max_buf_size: usize,
) -> (
    PeerTransport<T, BincodeDuplex<T>>,
    PeerTransport<T, BincodeDuplex<T>>,
)
where
    T: Serialize + DeserializeOwned + Unpin,
{
    let (a, b) = bincode_duplex::<T>(max_buf_size);
    (
        PeerTransport::new(a, Party::First),
        PeerTransport::new(b, Party::Second),
    )
}
