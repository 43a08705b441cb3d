// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::{tcp::OwnedWriteHalf, TcpStream},
  sync::{broadcast, mpsc, Mutex},
};
use tokio_util::sync::CancellationToken;

use edgelink_core::{
  codec::RawValue,
  errors::ConnectionError,
  metric::Metric,
  util::{sleep, spawn_task},
  PayloadFormat,
};
use edgelink_translator::{
  config::OpenProtocolConnDetails,
  connection::{ConnectionEvent, DeviceConnection, EVENT_CHANNEL_CAPACITY},
};

use crate::mid::{
  MidFrame,
  MID_COMM_NEGATIVE_ACK,
  MID_COMM_START,
  MID_COMM_START_ACK,
  MID_KEEP_ALIVE,
  MID_RESULT,
  MID_RESULT_ACK,
  MID_RESULT_SUBSCRIBE,
  MID_RESULT_UNSUBSCRIBE,
  TERMINATOR,
};

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(8);

pub struct OpenProtocolConnection {
  name: String,
  details: OpenProtocolConnDetails,
  events: broadcast::Sender<ConnectionEvent>,
  writer: Mutex<Option<mpsc::Sender<MidFrame>>>,
  cancel: Mutex<Option<CancellationToken>>,
}

impl OpenProtocolConnection {
  pub fn new(name: &str, details: OpenProtocolConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      events,
      writer: Mutex::new(None),
      cancel: Mutex::new(None),
    }
  }

  async fn write_frame(sink: &mut OwnedWriteHalf, frame: &MidFrame) -> Result<(), ConnectionError> {
    sink
      .write_all(&frame.encode())
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))
  }

  /// Read NUL-terminated frames, dispatch results, answer keep-alives.
  async fn socket_pump(
    name: String,
    stream: TcpStream,
    events: broadcast::Sender<ConnectionEvent>,
    mut outbound: mpsc::Receiver<MidFrame>,
    keep_alive: Duration,
    cancel: CancellationToken,
  ) {
    let (mut source, mut sink) = stream.into_split();
    // Communication start must be acknowledged before anything else.
    if let Err(e) = Self::write_frame(&mut sink, &MidFrame::new(MID_COMM_START, 1, "")).await {
      let _ = events.send(ConnectionEvent::Error(e.to_string()));
      let _ = events.send(ConnectionEvent::Close);
      return;
    }

    let mut buf = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];
    let mut started = false;
    let mut keep_alive_timer = tokio::time::interval(keep_alive);
    keep_alive_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = keep_alive_timer.tick(), if started => {
          if let Err(e) = Self::write_frame(&mut sink, &MidFrame::new(MID_KEEP_ALIVE, 1, "")).await {
            warn!("{name} keep-alive failed: {e}");
            break;
          }
        }
        frame = outbound.recv() => match frame {
          Some(frame) => {
            if let Err(e) = Self::write_frame(&mut sink, &frame).await {
              warn!("{name} send failed: {e}");
              let _ = events.send(ConnectionEvent::Error(e.to_string()));
              break;
            }
          }
          None => break,
        },
        read = source.read(&mut byte) => match read {
          Ok(0) => break,
          Ok(_) => {
            if byte[0] != TERMINATOR {
              buf.push(byte[0]);
              continue;
            }
            let frame = match MidFrame::decode(&buf) {
              Ok(frame) => frame,
              Err(e) => {
                warn!("{name} unparseable frame: {e}");
                buf.clear();
                continue;
              }
            };
            buf.clear();
            match frame.mid {
              MID_COMM_START_ACK => {
                debug!("{name} controller accepted communication start");
                started = true;
                let _ = events.send(ConnectionEvent::Open);
              }
              MID_COMM_NEGATIVE_ACK => {
                warn!("{name} controller rejected request: {}", frame.data);
                let _ = events.send(ConnectionEvent::Error(frame.data.clone()));
              }
              MID_RESULT => {
                let _ = Self::write_frame(&mut sink, &MidFrame::new(MID_RESULT_ACK, 1, "")).await;
                let mut values = HashMap::new();
                values.insert(
                  MID_RESULT.to_string(),
                  RawValue::Bytes(frame.data.clone().into_bytes()),
                );
                let _ = events.send(ConnectionEvent::Data { values, parse_vals: true });
              }
              MID_KEEP_ALIVE => {}
              other => debug!("{name} ignoring MID {other:04}"),
            }
          }
          Err(e) => {
            warn!("{name} socket error: {e}");
            let _ = events.send(ConnectionEvent::Error(e.to_string()));
            break;
          }
        }
      }
    }
    let _ = events.send(ConnectionEvent::Close);
    debug!("{name} socket pump stopped");
  }

  async fn send(&self, frame: MidFrame) -> Result<(), ConnectionError> {
    let writer = self.writer.lock().await;
    let writer = writer.as_ref().ok_or(ConnectionError::NotOpen)?;
    writer
      .send(frame)
      .await
      .map_err(|_| ConnectionError::Transport("frame writer gone".to_owned()))
  }
}

#[async_trait]
impl DeviceConnection for OpenProtocolConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut writer_slot = self.writer.lock().await;
    if writer_slot.is_some() {
      return Ok(());
    }
    let stream = TcpStream::connect((self.details.host.as_str(), self.details.port))
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    info!(
      "{} connected to controller {}:{}",
      self.name, self.details.host, self.details.port
    );
    let (frame_sender, frame_receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let keep_alive = self
      .details
      .keep_alive_secs
      .map(Duration::from_secs)
      .unwrap_or(DEFAULT_KEEP_ALIVE);
    spawn_task(Self::socket_pump(
      self.name.clone(),
      stream,
      self.events.clone(),
      frame_receiver,
      keep_alive,
      cancel.clone(),
    ));
    *writer_slot = Some(frame_sender);
    *self.cancel.lock().await = Some(cancel);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.writer.lock().await.take();
    if let Some(cancel) = self.cancel.lock().await.take() {
      cancel.cancel();
    }
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent> {
    self.events.subscribe()
  }

  /// Results are pushed by the controller after subscription; there is
  /// nothing to demand-read.
  async fn read_metrics(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    Ok(())
  }

  async fn write_metrics(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    Err(ConnectionError::WriteNotSupported(
      "tightening results are read only".to_owned(),
    ))
  }

  /// Arm the push pipeline: subscribe tightening results.
  async fn start_subscription(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    _interval: Duration,
    _device_id: &str,
  ) -> Result<(), ConnectionError> {
    // The controller may still be acking communication start; give the
    // handshake a moment before subscribing.
    sleep(Duration::from_millis(50)).await;
    self.send(MidFrame::new(MID_RESULT_SUBSCRIBE, 1, "")).await
  }

  async fn stop_subscription(&self, _device_id: &str) -> Result<(), ConnectionError> {
    self.send(MidFrame::new(MID_RESULT_UNSUBSCRIBE, 1, "")).await
  }
}
