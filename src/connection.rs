use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, instrument, warn};

use crate::adapter::{Adapter, AdapterError, Ignore};
use crate::command::Command;
use crate::frame::{AggregateLen, DataType};
use crate::parser::Parser;
use crate::request::Request;
use crate::{Error, Result};

/// Type-erased pending adapter plus its completion channel.
trait Completion: Send {
    fn sink(&mut self) -> &mut dyn Adapter;
    fn complete(self: Box<Self>, error: Option<Error>);
    fn is_abandoned(&self) -> bool;
}

struct Pending<A: Adapter> {
    adapter: A,
    tx: oneshot::Sender<Result<A>>,
}

impl<A: Adapter + 'static> Completion for Pending<A> {
    fn sink(&mut self) -> &mut dyn Adapter {
        &mut self.adapter
    }

    fn complete(self: Box<Self>, error: Option<Error>) {
        let result = match error {
            None => Ok(self.adapter),
            Some(err) => Err(err),
        };
        // The waiting future may have been dropped; nothing to deliver then.
        let _ = self.tx.send(result);
    }

    fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One submitted request: its wire bytes, the tags of the responses still
/// owed by the server, and the adapter that consumes them.
///
/// `written` flips when the payload is on the wire; from then on the entry
/// can only leave the queue by consuming its responses or by connection
/// teardown.
struct PendingRequest {
    id: u64,
    payload: Bytes,
    tags: VecDeque<Command>,
    written: bool,
    sink: Option<Box<dyn Completion>>,
    first_error: Option<Error>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Idle,
    Running,
    Closed,
}

struct State {
    status: Status,
    next_id: u64,
    pending: VecDeque<PendingRequest>,
    receivers: VecDeque<Box<dyn Completion>>,
    last_server_error: Option<String>,
}

struct Shared {
    state: Mutex<State>,
    writer_wake: Notify,
}

impl Shared {
    /// Fails every outstanding completion with `reason` and refuses new
    /// submissions until the next `run`.
    fn shutdown(&self, reason: Error) {
        let (pending, receivers) = {
            let mut state = self.state.lock().unwrap();
            state.status = Status::Closed;
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.receivers),
            )
        };
        for mut entry in pending {
            if let Some(sink) = entry.sink.take() {
                sink.complete(Some(reason.clone()));
            }
        }
        for sink in receivers {
            sink.complete(Some(reason.clone()));
        }
    }
}

/// Fails everything with `operation aborted` if `run` is cancelled rather
/// than returning.
struct ShutdownGuard<'a> {
    shared: &'a Shared,
    reason: Option<Error>,
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        let reason = self.reason.take().unwrap_or(Error::OperationAborted);
        self.shared.shutdown(reason);
    }
}

/// A pipelined client connection.
///
/// The connection owns one duplex byte stream and multiplexes every
/// submitted request onto it: requests are framed in submission order,
/// responses are matched back to their adapters in the same order, and
/// server pushes are routed out-of-band to [`Connection::receive`] callers.
///
/// `Connection` is a cheap handle: clone it to submit from several tasks
/// while one task drives [`Connection::run`].
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Connection {
        Connection {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: Status::Idle,
                    next_id: 0,
                    pending: VecDeque::new(),
                    receivers: VecDeque::new(),
                    last_server_error: None,
                }),
                writer_wake: Notify::new(),
            }),
        }
    }

    /// Submits a request and waits for all of its responses.
    ///
    /// Submission itself never suspends: the request is appended to the
    /// pending queue and the writer is woken. The future resolves once the
    /// server has answered every tagged command, returning the adapter so
    /// the caller can extract the materialized values, or the first error
    /// recorded for the request.
    pub async fn exec<A: Adapter + 'static>(&self, req: &Request, adapter: A) -> Result<A> {
        if req.is_empty() {
            return Ok(adapter);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.status == Status::Closed {
                return Err(Error::NotConnected);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(PendingRequest {
                id,
                payload: Bytes::copy_from_slice(req.payload()),
                tags: req.tags().clone(),
                written: false,
                sink: Some(Box::new(Pending { adapter, tx })),
                first_error: None,
            });
        }
        self.shared.writer_wake.notify_one();

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationAborted),
        }
    }

    /// Waits for the next server push and materializes it with `adapter`.
    pub async fn receive<A: Adapter + 'static>(&self, adapter: A) -> Result<A> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.status == Status::Closed {
                return Err(Error::NotConnected);
            }
            state.receivers.push_back(Box::new(Pending { adapter, tx }));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationAborted),
        }
    }

    /// The diagnostic text of the most recent server-reported error frame.
    pub fn last_server_error(&self) -> Option<String> {
        self.shared.state.lock().unwrap().last_server_error.clone()
    }

    /// Connects over TCP and drives the connection on the new stream.
    pub async fn run_tcp<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let stream = TcpStream::connect(addr).await?;
        self.run(stream).await
    }

    /// Drives the reader and writer loops on `stream` until a fatal error,
    /// cancellation, or a server-initiated close.
    ///
    /// A clean EOF with no outstanding responses (the server closing after
    /// a `QUIT`) completes with `Ok`. Every other exit fails all pending
    /// and push completions with the same error; cancelling the future
    /// fails them with `operation aborted`.
    #[instrument(name = "connection", skip_all)]
    pub async fn run<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.status == Status::Running {
                return Err(Error::AlreadyRunning);
            }
            state.status = Status::Running;
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let mut guard = ShutdownGuard {
            shared: &self.shared,
            reason: None,
        };

        let reader = Reader {
            shared: &self.shared,
            stream: read_half,
            buf: BytesMut::with_capacity(4096),
            trans: VecDeque::new(),
            in_trans: false,
        };

        let result = tokio::select! {
            res = reader.run() => res,
            res = write_loop(&self.shared, write_half) => res,
        };

        guard.reason = Some(match &result {
            Ok(()) => Error::NotConnected,
            Err(err) => err.clone(),
        });
        drop(guard);

        result
    }
}

/// Writes queued requests in FIFO order, one atomic write per request, and
/// sleeps on the wakeup primitive when nothing is queued.
async fn write_loop<W>(shared: &Shared, mut stream: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match next_unwritten(shared) {
            Some((id, payload)) => {
                stream.write_all(&payload).await?;
                stream.flush().await?;
                debug!(bytes = payload.len(), "request written");
                reap_written(shared, id);
            }
            None => shared.writer_wake.notified().await,
        }
    }
}

/// Marks the first unwritten request as on-the-wire and returns its
/// payload. Entries whose submitter has gone away are discarded here,
/// before they cost any wire traffic; once written they are past the point
/// of no return.
fn next_unwritten(shared: &Shared) -> Option<(u64, Bytes)> {
    let mut state = shared.state.lock().unwrap();
    loop {
        let idx = state.pending.iter().position(|entry| !entry.written)?;
        let abandoned = state.pending[idx]
            .sink
            .as_ref()
            .is_some_and(|sink| sink.is_abandoned());
        if abandoned {
            state.pending.remove(idx);
            continue;
        }
        let entry = &mut state.pending[idx];
        entry.written = true;
        return Some((entry.id, entry.payload.clone()));
    }
}

/// A request whose commands all answer with pushes owes no responses:
/// complete it as soon as its bytes are out.
fn reap_written(shared: &Shared, id: u64) {
    let finished = {
        let mut state = shared.state.lock().unwrap();
        match state
            .pending
            .iter()
            .position(|entry| entry.id == id && entry.tags.is_empty())
        {
            Some(idx) => state.pending.remove(idx),
            None => None,
        }
    };
    if let Some(mut entry) = finished {
        if let Some(sink) = entry.sink.take() {
            sink.complete(entry.first_error.take());
        }
    }
}

/// The reader half: owns the read buffer, the parser invocations and the
/// transaction sub-queue.
struct Reader<'a, R> {
    shared: &'a Shared,
    stream: R,
    buf: BytesMut,
    /// Tags queued since the last MULTI. EXEC validates its reply element
    /// count against this; DISCARD empties it.
    trans: VecDeque<Command>,
    in_trans: bool,
}

/// Wraps the EXEC reply sink so the reader sees the top-level header of the
/// reply while the events flow through to the request adapter.
struct ExecProbe<'a> {
    inner: &'a mut dyn Adapter,
    header: &'a mut Option<AggregateLen>,
}

impl Adapter for ExecProbe<'_> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        depth: usize,
    ) -> std::result::Result<(), AdapterError> {
        self.inner.on_simple(kind, text, depth)
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> std::result::Result<(), AdapterError> {
        if depth == 0 {
            *self.header = Some(len);
        }
        self.inner.on_aggregate(kind, len, depth)
    }

    fn on_end(&mut self) {
        self.inner.on_end();
    }
}

impl<R: AsyncRead + Unpin> Reader<'_, R> {
    async fn run(mut self) -> Result<()> {
        loop {
            while self.buf.is_empty() {
                if self.stream.read_buf(&mut self.buf).await? == 0 {
                    let idle = self.shared.state.lock().unwrap().pending.is_empty();
                    return if idle { Ok(()) } else { Err(Error::UnexpectedEof) };
                }
            }

            let is_push = DataType::try_from(self.buf[0])
                .map(|kind| kind == DataType::Push)
                .unwrap_or(false);
            if is_push {
                self.handle_push().await?;
            } else {
                self.handle_response().await?;
            }
        }
    }

    /// Drives the parser over exactly one top-level value, reading more
    /// bytes as needed. Protocol errors are fatal; adapter errors are
    /// handed back for per-response handling.
    async fn read_frame(&mut self, sink: &mut dyn Adapter) -> Result<Option<AdapterError>> {
        let mut parser = Parser::new();
        loop {
            let consumed = parser.advance(&self.buf, sink)?;
            self.buf.advance(consumed);
            if parser.done() {
                return Ok(parser.take_sink_error());
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::UnexpectedEof);
            }
        }
    }

    /// Reads an EXEC reply and checks its element count against the
    /// commands queued since MULTI. A mismatched array fails the request
    /// even when the adapter itself accepts any shape.
    async fn read_exec_reply(&mut self, sink: &mut dyn Adapter) -> Result<Option<AdapterError>> {
        let expected = self.trans.len();
        let mut header = None;
        let sink_err = {
            let mut probe = ExecProbe {
                inner: sink,
                header: &mut header,
            };
            self.read_frame(&mut probe).await?
        };
        if sink_err.is_some() {
            return Ok(sink_err);
        }
        match header {
            Some(AggregateLen::Count(actual)) if actual != expected => {
                Ok(Some(AdapterError::IncompatibleSize { expected, actual }))
            }
            _ => Ok(None),
        }
    }

    /// Routes a push frame to the next registered receiver, or drains it
    /// when nobody is listening. The pending queue is untouched.
    async fn handle_push(&mut self) -> Result<()> {
        let receiver = {
            let mut state = self.shared.state.lock().unwrap();
            loop {
                match state.receivers.pop_front() {
                    Some(sink) if sink.is_abandoned() => continue,
                    other => break other,
                }
            }
        };

        match receiver {
            Some(mut sink) => {
                let sink_err = match self.read_frame(sink.sink()).await {
                    Ok(sink_err) => sink_err,
                    Err(fatal) => {
                        sink.complete(Some(fatal.clone()));
                        return Err(fatal);
                    }
                };
                sink.complete(sink_err.map(Error::Adapter));
            }
            None => {
                let mut drop_sink = Ignore;
                self.read_frame(&mut drop_sink).await?;
                warn!("push frame dropped: no receiver registered");
            }
        }
        Ok(())
    }

    /// Consumes one response frame for the head command of the front
    /// pending request.
    async fn handle_response(&mut self) -> Result<()> {
        let (cmd, sink) = {
            let mut state = self.shared.state.lock().unwrap();
            let Some(front) = state.pending.front_mut() else {
                return Err(Error::UnsolicitedResponse);
            };
            let Some(cmd) = front.tags.front().cloned() else {
                return Err(Error::UnsolicitedResponse);
            };
            (cmd, front.sink.take())
        };
        let Some(mut sink) = sink else {
            return Err(Error::UnsolicitedResponse);
        };

        let frame_result = if cmd == Command::Discard && !self.in_trans {
            // No MULTI to pop back to: the reply (the server rejects a bare
            // DISCARD) is drained and the command fails client-side.
            let mut drop_sink = Ignore;
            self.read_frame(&mut drop_sink)
                .await
                .map(|_| Some(AdapterError::Unexpected))
        } else if cmd == Command::Exec && self.in_trans {
            self.read_exec_reply(sink.sink()).await
        } else {
            self.read_frame(sink.sink()).await
        };
        let sink_err = match frame_result {
            Ok(sink_err) => sink_err,
            Err(fatal) => {
                // The request fails with the same code teardown hands to
                // everything else still in the queue.
                sink.complete(Some(fatal.clone()));
                return Err(fatal);
            }
        };

        // Transaction bookkeeping on the sub-queue owned by this reader.
        match cmd {
            Command::Multi => {
                self.in_trans = true;
                self.trans.clear();
            }
            Command::Exec => {
                debug!(queued = self.trans.len(), "transaction dispatched");
                self.in_trans = false;
                self.trans.clear();
            }
            Command::Discard => {
                self.in_trans = false;
                self.trans.clear();
            }
            cmd if self.in_trans => self.trans.push_back(cmd),
            _ => {}
        }

        if let Some(AdapterError::SimpleError(msg)) | Some(AdapterError::BlobError(msg)) =
            &sink_err
        {
            self.shared.state.lock().unwrap().last_server_error = Some(msg.clone());
        }

        let finished = {
            let mut state = self.shared.state.lock().unwrap();
            let Some(front) = state.pending.front_mut() else {
                return Err(Error::UnsolicitedResponse);
            };
            front.tags.pop_front();
            if front.first_error.is_none() {
                if let Some(err) = sink_err {
                    front.first_error = Some(Error::Adapter(err));
                }
            }
            if front.tags.is_empty() {
                let error = front.first_error.take();
                state.pending.pop_front();
                Some((sink, error))
            } else {
                front.sink = Some(sink);
                None
            }
        };
        if let Some((sink, error)) = finished {
            sink.complete(error);
        }
        Ok(())
    }
}
