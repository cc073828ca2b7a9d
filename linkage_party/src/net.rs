//! A fully connected TCP mesh between the parties of a session.
//!
//! Every party listens on its own address, dials all parties with a lower id and accepts the
//! connections of all parties with a higher id. A dialer announces its id as a big endian `u32`.
//! Afterwards both directions carry [`Frame`]s, each encoded with bincode and prefixed by its
//! length as a big endian `u32`.

use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

use linkage::{Channel, Error, Frame, Link, PartyId};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

/// The largest accepted frame, in bytes.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

fn io_error(e: std::io::Error) -> Error {
    Error::Io(e.to_string())
}

/// Connects the party `pid` to all `peers`, which are indexed by party id and include the local
/// listening address.
///
/// Fails if not all connections are established within `connect_timeout`.
pub async fn connect(
    pid: PartyId,
    peers: &[SocketAddr],
    connect_timeout: Duration,
) -> Result<Channel, Error> {
    let party_count = peers.len();
    let Some(local) = peers.get(pid) else {
        return Err(Error::InvalidPartyId);
    };
    let listener = TcpListener::bind(local).await.map_err(io_error)?;
    info!(pid, party_count, "listening on {local}");

    let dial_lower = async {
        let mut streams = vec![];
        for (peer, addr) in peers.iter().enumerate().take(pid) {
            streams.push((peer, dial(pid, *addr).await?));
        }
        Ok::<_, Error>(streams)
    };
    let accept_higher = accept(&listener, pid, party_count);
    let (dialed, accepted) = timeout(connect_timeout, async {
        tokio::try_join!(dial_lower, accept_higher)
    })
    .await
    .map_err(|_| {
        Error::Io(format!(
            "could not reach all peers within {}s",
            connect_timeout.as_secs()
        ))
    })??;

    let mut links = BTreeMap::new();
    let mut writers = vec![];
    let mut readers = vec![];
    for (peer, stream) in dialed.into_iter().chain(accepted) {
        let (read_half, write_half) = stream.into_split();
        let (to_peer, outgoing) = unbounded_channel();
        let (incoming, from_peer) = unbounded_channel();
        writers.push(tokio::spawn(write_frames(write_half, outgoing, pid, peer)));
        readers.push(tokio::spawn(read_frames(read_half, incoming, pid, peer)));
        links.insert(peer, Link::new(to_peer, from_peer));
    }
    info!(pid, "connected to all peers");
    Ok(Channel::new(pid, party_count, links).with_tasks(writers, readers))
}

async fn dial(pid: PartyId, addr: SocketAddr) -> Result<TcpStream, Error> {
    let mut stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) => {
                debug!(pid, "{addr} not reachable yet: {e}");
                sleep(RETRY_INTERVAL).await;
            }
        }
    };
    stream.set_nodelay(true).map_err(io_error)?;
    stream.write_u32(pid as u32).await.map_err(io_error)?;
    Ok(stream)
}

async fn accept(
    listener: &TcpListener,
    pid: PartyId,
    party_count: usize,
) -> Result<Vec<(PartyId, TcpStream)>, Error> {
    let mut streams: Vec<(PartyId, TcpStream)> = vec![];
    while streams.len() < party_count - pid - 1 {
        let (mut stream, addr) = listener.accept().await.map_err(io_error)?;
        stream.set_nodelay(true).map_err(io_error)?;
        let peer = match stream.read_u32().await {
            Ok(peer) => peer as PartyId,
            Err(e) => {
                warn!(pid, "dropping connection from {addr} without party id: {e}");
                continue;
            }
        };
        if peer <= pid || peer >= party_count || streams.iter().any(|(p, _)| *p == peer) {
            warn!(pid, "dropping connection from {addr} announcing party {peer}");
            continue;
        }
        debug!(pid, peer, "accepted connection from {addr}");
        streams.push((peer, stream));
    }
    Ok(streams)
}

/// Writes a single length-prefixed frame.
async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), Error> {
    let bytes = bincode::serialize(frame)?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| Error::Io(format!("frame of {} bytes is too large", bytes.len())))?;
    writer.write_u32(len).await.map_err(io_error)?;
    writer.write_all(&bytes).await.map_err(io_error)?;
    Ok(())
}

/// Reads a single length-prefixed frame, `None` if the stream ended between two frames.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, Error> {
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    if len > MAX_FRAME_LEN {
        return Err(Error::Io(format!("frame of {len} bytes is too large")));
    }
    let mut bytes = vec![0; len as usize];
    reader.read_exact(&mut bytes).await.map_err(io_error)?;
    Ok(Some(bincode::deserialize(&bytes)?))
}

async fn write_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut frames: UnboundedReceiver<Frame>,
    pid: PartyId,
    peer: PartyId,
) {
    while let Some(frame) = frames.recv().await {
        let last = !matches!(frame, Frame::Data(_));
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(pid, peer, "could not send frame: {e}");
            return;
        }
        if last {
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(pid, peer, "could not shut down connection: {e}");
    }
}

async fn read_frames<R: AsyncRead + Unpin>(
    mut reader: R,
    frames: UnboundedSender<Frame>,
    pid: PartyId,
    peer: PartyId,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let last = !matches!(frame, Frame::Data(_));
                if frames.send(frame).is_err() || last {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(pid, peer, "could not receive frame: {e}");
                break;
            }
        }
    }
}
