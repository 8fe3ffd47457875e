//! The background driver task that owns a connection's socket and realizes
//! true stream-id multiplexing (`spec.md` §4.3; `SPEC_FULL.md` §4.3's
//! documented divergence from the teacher's caller-polled state machine).
use std::{collections::HashMap, time::Instant};

use bytes::{Buf, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{mpsc, oneshot},
    time::{interval, MissedTickBehavior},
};

use crate::{
    error::{Error, Result},
    frame::{FrameHeader, FrameReader, FrameWriter, FRAME_HEADER_LEN, PROTOCOL_VERSION},
    protocol::{opcode::Opcode, request::Request, response::Response},
};

use super::{socket::Socket, stream_id::StreamIdAllocator};

/// Message sent from a [`super::handle::ConnectionHandle`] to its actor.
pub(super) enum ActorMessage {
    Send { request: Request, reply: oneshot::Sender<Result<Response>> },
    Shutdown,
}

/// Owns the socket and the in-flight slab; runs until the handle and all of
/// its clones are dropped or the connection is declared defunct.
pub(super) struct ConnectionActor {
    socket: Socket,
    inbox: mpsc::Receiver<ActorMessage>,
    stream_ids: StreamIdAllocator,
    in_flight: HashMap<i16, oneshot::Sender<Result<Response>>>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    heartbeat_interval: std::time::Duration,
    last_activity: Instant,
    events: mpsc::UnboundedSender<crate::protocol::response::Event>,
    consecutive_timeouts: u32,
    defunct_read_timeout_threshold: u32,
    defunct: Option<String>,
}

impl ConnectionActor {
    pub(super) fn new(
        socket: Socket,
        inbox: mpsc::Receiver<ActorMessage>,
        max_in_flight: u16,
        heartbeat_interval: std::time::Duration,
        defunct_read_timeout_threshold: u32,
        events: mpsc::UnboundedSender<crate::protocol::response::Event>,
    ) -> Self {
        Self {
            socket,
            inbox,
            stream_ids: StreamIdAllocator::new(max_in_flight),
            in_flight: HashMap::new(),
            read_buf: BytesMut::with_capacity(64 * 1024),
            write_buf: BytesMut::with_capacity(8 * 1024),
            heartbeat_interval,
            last_activity: Instant::now(),
            events,
            consecutive_timeouts: 0,
            defunct_read_timeout_threshold,
            defunct: None,
        }
    }

    pub(super) async fn run(mut self) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut read_chunk = [0u8; 16 * 1024];

        loop {
            tokio::select! {
                biased;

                msg = self.inbox.recv() => {
                    match msg {
                        Some(ActorMessage::Send { request, reply }) => {
                            self.dispatch_send(request, reply).await;
                        }
                        Some(ActorMessage::Shutdown) | None => {
                            self.fail_all_in_flight(Error::shutdown());
                            return;
                        }
                    }
                }

                read_result = self.socket.read(&mut read_chunk) => {
                    match read_result {
                        Ok(0) => {
                            self.mark_defunct("connection closed by peer".to_string());
                            return;
                        }
                        Ok(n) => {
                            self.last_activity = Instant::now();
                            self.consecutive_timeouts = 0;
                            self.read_buf.extend_from_slice(&read_chunk[..n]);
                            if let Err(err) = self.drain_complete_frames() {
                                self.mark_defunct(err.to_string());
                                return;
                            }
                        }
                        Err(err) => {
                            self.mark_defunct(err.to_string());
                            return;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    if self.last_activity.elapsed() >= self.heartbeat_interval {
                        if let Err(err) = self.send_heartbeat().await {
                            self.consecutive_timeouts += 1;
                            if self.consecutive_timeouts >= self.defunct_read_timeout_threshold {
                                self.mark_defunct(format!("heartbeat failed: {err}"));
                                return;
                            }
                        }
                    }
                }
            }

            if self.defunct.is_some() {
                return;
            }
        }
    }

    async fn dispatch_send(&mut self, request: Request, reply: oneshot::Sender<Result<Response>>) {
        let Some(stream_id) = self.stream_ids.acquire() else {
            let _ = reply.send(Err(Error::from(crate::error::ErrorKind::BusyConnection)));
            return;
        };

        let opcode = request.opcode();
        let mut body = FrameWriter::new();
        request.encode(&mut body);
        let body = body.into_bytes();

        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            flags: 0,
            stream_id,
            opcode: opcode.code(),
            length: body.len() as i32,
        };

        let mut frame = FrameWriter::with_capacity(FRAME_HEADER_LEN + body.len());
        header.write(&mut frame);
        frame.put_slice(&body);

        self.in_flight.insert(stream_id, reply);

        if let Err(err) = self.socket.write_all(&frame.into_bytes()).await {
            if let Some(reply) = self.in_flight.remove(&stream_id) {
                let _ = reply.send(Err(Error::from(err)));
            }
            self.stream_ids.release(stream_id);
        }
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.dispatch_send(Request::Options, tx).await;
        match tokio::time::timeout(self.heartbeat_interval, rx).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::internal("heartbeat reply channel dropped")),
            Err(_) => Err(Error::from(crate::error::ErrorKind::OperationTimedOut)),
        }
    }

    /// Parse as many complete frames as `read_buf` currently holds.
    fn drain_complete_frames(&mut self) -> Result<()> {
        loop {
            if self.read_buf.len() < FRAME_HEADER_LEN {
                return Ok(());
            }
            let header = FrameHeader::parse(&self.read_buf[..FRAME_HEADER_LEN])
                .map_err(|e| Error::internal(format!("frame header: {e}")))?;
            let total_len = FRAME_HEADER_LEN + header.length.max(0) as usize;
            if self.read_buf.len() < total_len {
                return Ok(());
            }

            let mut frame = self.read_buf.split_to(total_len);
            frame.advance(FRAME_HEADER_LEN);
            let body = frame.freeze();
            let mut reader = FrameReader::new(body);

            let opcode = Opcode::from_code(header.opcode)
                .ok_or_else(|| Error::internal(format!("unknown opcode 0x{:02x}", header.opcode)))?;

            let response = Response::parse(opcode, &mut reader)
                .map_err(|e| Error::from(crate::error::ErrorKind::Protocol(e)));

            if header.stream_id < 0 {
                if let Ok(Response::Event(event)) = response {
                    let _ = self.events.send(event);
                }
                continue;
            }

            if let Some(reply) = self.in_flight.remove(&header.stream_id) {
                self.stream_ids.release(header.stream_id);
                let _ = reply.send(response);
            }
        }
    }

    fn fail_all_in_flight(&mut self, err: Error) {
        for (_, reply) in self.in_flight.drain() {
            let _ = reply.send(Err(Error::from(crate::error::ErrorKind::Internal(err.to_string()))));
        }
    }

    fn mark_defunct(&mut self, reason: String) {
        #[cfg(feature = "log")]
        log::warn!("connection defunct: {reason}");
        self.defunct = Some(reason.clone());
        self.fail_all_in_flight(Error::internal(reason));
    }
}
