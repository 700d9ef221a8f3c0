//! Client side of the clockistryd socket

use clockistry_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};
use clockistry_util::UserId;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

use crate::{IpcError, IpcResult};

/// Request/response connection to clockistryd.
///
/// Requests are answered in order, one line each, so a client keeps a single
/// request in flight.
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path.as_ref()).await?;
        debug!(socket = %socket_path.as_ref().display(), "Connected to clockistryd");
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and return the raw response envelope.
    ///
    /// Request id 0 is reserved for replies to lines the service could not
    /// parse, so it is accepted in place of our own id.
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut line = serde_json::to_string(&Request::new(request_id, command))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let response: Response = read_message(&mut self.reader).await?;
        if response.request_id != request_id && response.request_id != 0 {
            return Err(IpcError::Mismatched {
                expected: request_id,
                got: response.request_id,
            });
        }

        Ok(response)
    }

    /// Send a command and unwrap its payload; service errors become
    /// [`IpcError::Rejected`]
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(e) => Err(IpcError::Rejected {
                code: e.code,
                message: e.message,
            }),
        }
    }

    /// Switch this connection to receiving timer events.
    ///
    /// With `user_id` set, only that user's events and service-wide ones
    /// such as shutdown are delivered.
    pub async fn subscribe(mut self, user_id: Option<UserId>) -> IpcResult<EventStream> {
        self.call(Command::SubscribeEvents { user_id }).await?;

        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Timer events pushed by clockistryd to a subscribed connection
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    // Dropping the write half would read as a disconnect on the server side
    _writer: OwnedWriteHalf,
}

impl EventStream {
    pub async fn next(&mut self) -> IpcResult<Event> {
        read_message(&mut self.reader).await
    }
}

async fn read_message<T: serde::de::DeserializeOwned>(
    reader: &mut BufReader<OwnedReadHalf>,
) -> IpcResult<T> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim())?)
}
