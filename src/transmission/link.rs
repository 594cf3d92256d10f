//! Message-passing boundary between a host and one aptitude.
//!
//! A [`Link`] is one end of a bidirectional envelope channel: an outlet
//! toward the peer and a local [`Mailbox`] fed by it.
//!
//! - [`Link::pair`] joins two ends in-process (peer mailboxes).
//! - [`Link::over_stream`] frames envelopes onto any byte stream
//!   (child stdin/stdout); a reader thread decodes inbound frames into the
//!   mailbox and posts [`Envelope::Shutdown`] on end-of-stream.
//!
//! ```text
//!   Link A                              Link B
//!   outlet ───────────────────────────▶ inbox
//!   inbox  ◀─────────────────────────── outlet
//! ```

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use super::Envelope;
use super::codec::{FrameDecoder, decode_envelope, encode_envelope};
use crate::drivers::task;
use crate::error::LinkError;
use crate::timer;

/// Envelopes buffered per mailbox.
pub const MAILBOX_DEPTH: usize = 32;

/// How long a send waits for room in the peer mailbox.
const SEND_WINDOW: Duration = Duration::from_secs(1);

/// Anything envelopes can be sent into.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: &Envelope) -> Result<(), LinkError>;
}

/// Bounded inbound queue of one link end.
pub struct Mailbox {
    queue: Channel<CriticalSectionRawMutex, Envelope, MAILBOX_DEPTH>,
    closed: AtomicBool,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Channel::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn deliver(&self, envelope: Envelope) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        timer::block_on_timeout(self.queue.send(envelope), SEND_WINDOW).ok_or(LinkError::Full)
    }

    /// Mark closed and wake the owner with a final `Shutdown`.
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.queue.try_send(Envelope::Shutdown);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

enum Outlet {
    Peer(Arc<Mailbox>),
    Stream(Mutex<Box<dyn Write + Send>>),
}

/// One end of an envelope channel.
pub struct Link {
    label: String,
    outlet: Outlet,
    inbox: Arc<Mailbox>,
}

impl Link {
    /// Two connected in-process ends.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Mailbox::new());
        let b = Arc::new(Mailbox::new());
        (
            Self {
                label: "pair-a".into(),
                outlet: Outlet::Peer(b.clone()),
                inbox: a.clone(),
            },
            Self {
                label: "pair-b".into(),
                outlet: Outlet::Peer(a),
                inbox: b,
            },
        )
    }

    /// Frame envelopes onto `writer`; decode frames from `reader` on a
    /// dedicated thread.
    pub fn over_stream<R, W>(label: &str, reader: R, writer: W) -> Result<Self, LinkError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let inbox = Arc::new(Mailbox::new());
        let feed = inbox.clone();
        let thread_label = label.to_owned();
        task::spawn_named(&format!("link-{label}"), 32, move || {
            read_loop(&thread_label, reader, &feed);
        })?;
        Ok(Self {
            label: label.to_owned(),
            outlet: Outlet::Stream(Mutex::new(Box::new(writer))),
            inbox,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Next inbound envelope, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        timer::block_on_timeout(self.inbox.queue.receive(), timeout)
    }

    /// Next inbound envelope.  A closed link yields `Shutdown`.
    pub fn recv(&self) -> Envelope {
        timer::block_on(self.inbox.queue.receive())
    }

    pub fn inbox(&self) -> &Mailbox {
        &self.inbox
    }
}

impl Transport for Link {
    fn send(&self, envelope: &Envelope) -> Result<(), LinkError> {
        match &self.outlet {
            Outlet::Peer(peer) => peer.deliver(envelope.clone()),
            Outlet::Stream(writer) => {
                let frame = encode_envelope(envelope)?;
                let mut w = writer.lock().unwrap_or_else(PoisonError::into_inner);
                let written = w.write_all(&frame).and_then(|()| w.flush());
                written.map_err(|e| match e.kind() {
                    io::ErrorKind::BrokenPipe => LinkError::Closed,
                    _ => LinkError::from(e),
                })
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.inbox.close();
        if let Outlet::Peer(peer) = &self.outlet {
            peer.close();
        }
    }
}

fn read_loop<R: Read>(label: &str, mut reader: R, inbox: &Mailbox) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("LINK[{}]: end of stream", label);
                break;
            }
            Ok(n) => decoder.feed(&buf[..n], |frame| match decode_envelope(frame) {
                Ok(envelope) => {
                    if !inbox.is_closed() {
                        timer::block_on(inbox.queue.send(envelope));
                    }
                }
                Err(e) => warn!("LINK[{}]: dropping frame: {}", label, e),
            }),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("LINK[{}]: read failed: {}", label, e);
                break;
            }
        }
    }
    // The owner may be draining a full mailbox; give it the send window.
    if !inbox.closed.swap(true, Ordering::AcqRel) {
        let _ = timer::block_on_timeout(inbox.queue.send(Envelope::Shutdown), SEND_WINDOW);
    }
}
