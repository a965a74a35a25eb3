use std::{io, net::SocketAddr, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, warn};

use crate::Party;

use super::{wrap_channel_with_bincode, BincodeStreamSink, NetworkConfig, PeerTransport};

/// Delay in milliseconds after which connection to peer is retried.
const CONNECTION_RETRY_DELAY: u64 = 1000;

/// Handshake magic exchanged by both parties before framing starts.
const HANDSHAKE_MAGIC: u32 = 0x5345_4d44;

/// Bincode-encoded network channel.
pub type NetChannel<T> = BincodeStreamSink<T, TcpStream>;

/// Establish network connection to the other party.
/// The second party listens on its configured address, the first party dials it.
pub async fn connect_peer<T>(
    config: &NetworkConfig,
    party: Party,
) -> Result<PeerTransport<T, NetChannel<T>>, io::Error>
where
    T: Serialize + DeserializeOwned,
{
    let socket = match party {
        Party::First => connect_to_party(config.party(Party::Second).address, party).await?,
        Party::Second => listen_for_party(config.party(Party::Second).address).await?,
    };
    socket.set_nodelay(true)?;
    let transport = PeerTransport::new(wrap_channel_with_bincode(socket), party);
    Ok(transport.with_receive_timeout(config.receive_timeout()))
}

/// Accept the first connection that completes the handshake.
async fn listen_for_party(addr: SocketAddr) -> Result<TcpStream, io::Error> {
    let listener = TcpListener::bind(addr).await?;
    debug!(%addr, "Waiting for peer");

    loop {
        let (socket, remote) = listener.accept().await?;
        match accept_party(socket).await {
            Ok(socket) => return Ok(socket),
            Err(err) => warn!(%remote, %err, "Rejected incoming connection"),
        }
    }
}

/// Process incoming connection from the first party.
async fn accept_party(mut socket: TcpStream) -> Result<TcpStream, io::Error> {
    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid magic"));
    }

    let party_id = socket.read_u32().await? as usize;
    if Party::from_id(party_id) != Some(Party::First) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid party ID"));
    }

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.flush().await?;

    Ok(socket)
}

/// Connect to the listening party, retrying until it is up.
async fn connect_to_party(addr: SocketAddr, this_party: Party) -> Result<TcpStream, io::Error> {
    let mut socket = loop {
        match TcpStream::connect(addr).await {
            Ok(socket) => break socket,
            Err(err) => {
                debug!(%addr, %err, "Peer not reachable yet, retrying");
                tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_DELAY)).await
            }
        }
    };

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.write_u32(this_party.id() as u32).await?;
    socket.flush().await?;

    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid magic"));
    }

    Ok(socket)
}
