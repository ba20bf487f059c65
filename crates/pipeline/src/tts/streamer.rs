//! Outbound synthesis drainer
//!
//! One long-lived worker per session pulls sentences off the speech queue,
//! opens a synthesis channel for each, and converts the 16 kHz linear PCM
//! into 20 ms base64 µ-law frames on the carrier. Cancellation is checked
//! between every frame; a cancelled item is dropped without synthesis, which
//! is how the queue drains after a barge-in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicegate_core::{
    audio, MediaTransport, TextToSpeech, CARRIER_SAMPLE_RATE, FRAME_BYTES, MULAW_SILENCE,
    WIDEBAND_SAMPLE_RATE,
};

/// Items on the per-session speech queue
#[derive(Debug)]
pub enum SpeechItem {
    /// One sentence to synthesise and emit
    Sentence {
        text: String,
        cancel: CancellationToken,
    },
    /// Marker pushed after the last sentence of a turn
    TurnComplete { cancel: CancellationToken },
}

/// Notifications from the drainer back to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsNotice {
    /// All sentences of the current turn have been spoken
    TurnDrained,
    /// The carrier rejected an outbound frame
    TransportError,
}

enum SpeakAbort {
    Cancelled,
    Transport,
    Upstream(String),
}

/// Sentence drainer worker
pub struct TtsStreamer {
    tts: Arc<dyn TextToSpeech>,
    transport: Arc<dyn MediaTransport>,
    voice_id: String,
    notices: mpsc::Sender<TtsNotice>,
    /// Updated on every frame sent; the session watchdog reads it
    progress: Arc<Mutex<Instant>>,
    send_timeout: Duration,
}

const FADE_SAMPLES: usize = 160;

impl TtsStreamer {
    pub fn new(
        tts: Arc<dyn TextToSpeech>,
        transport: Arc<dyn MediaTransport>,
        voice_id: String,
        notices: mpsc::Sender<TtsNotice>,
        progress: Arc<Mutex<Instant>>,
    ) -> Self {
        Self {
            tts,
            transport,
            voice_id,
            notices,
            progress,
            send_timeout: Duration::from_millis(500),
        }
    }

    /// Drain the speech queue until the session closes it
    pub async fn run(self, mut queue: mpsc::Receiver<SpeechItem>) {
        while let Some(item) = queue.recv().await {
            match item {
                SpeechItem::Sentence { text, cancel } => {
                    if cancel.is_cancelled() {
                        continue;
                    }
                    tracing::info!(chars = text.len(), "speaking sentence");
                    let started = Instant::now();
                    match self.speak_sentence(&text, &cancel).await {
                        Ok(frames) => {
                            tracing::debug!(
                                frames,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "sentence completed"
                            );
                        }
                        Err(SpeakAbort::Cancelled) => {
                            tracing::debug!("sentence cancelled mid-stream");
                        }
                        Err(SpeakAbort::Transport) => {
                            let _ = self.notices.send(TtsNotice::TransportError).await;
                        }
                        Err(SpeakAbort::Upstream(e)) => {
                            // Drop this sentence, proceed to the next in queue
                            tracing::warn!("tts upstream error, dropping sentence: {e}");
                        }
                    }
                }
                SpeechItem::TurnComplete { cancel } => {
                    if !cancel.is_cancelled()
                        && self.notices.send(TtsNotice::TurnDrained).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
        tracing::debug!("speech queue closed, drainer exiting");
    }

    async fn speak_sentence(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, SpeakAbort> {
        let mut stream = self
            .tts
            .synthesize_stream(text, &self.voice_id)
            .await
            .map_err(|e| SpeakAbort::Upstream(e.to_string()))?;

        let mut resampler = audio::LinearResampler::new(WIDEBAND_SAMPLE_RATE, CARRIER_SAMPLE_RATE);
        let mut pending: Vec<i16> = Vec::new();
        let mut byte_carry: Option<u8> = None;
        let mut faded_in = false;
        let mut frames_sent: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(SpeakAbort::Cancelled),
                chunk = stream.audio.recv() => chunk,
            };
            let Some(mut bytes) = chunk else { break };

            if let Some(carry) = byte_carry.take() {
                bytes.insert(0, carry);
            }
            if bytes.len() % 2 != 0 {
                byte_carry = bytes.pop();
            }

            let wide = audio::pcm_from_le_bytes(&bytes);
            let mut narrow = resampler.process(&wide);
            if !faded_in {
                fade_in(&mut narrow);
                faded_in = true;
            }
            pending.extend_from_slice(&narrow);

            while pending.len() >= FRAME_BYTES {
                if cancel.is_cancelled() {
                    return Err(SpeakAbort::Cancelled);
                }
                let frame: Vec<i16> = pending.drain(..FRAME_BYTES).collect();
                self.send_frame(&audio::mulaw_encode(&frame)).await?;
                frames_sent += 1;
            }
        }

        // Residual after the synthesis channel closed
        if !pending.is_empty() {
            if cancel.is_cancelled() {
                return Err(SpeakAbort::Cancelled);
            }
            fade_out(&mut pending);
            let mut mulaw = audio::mulaw_encode(&pending);
            let padded = mulaw.len().div_ceil(FRAME_BYTES) * FRAME_BYTES;
            mulaw.resize(padded, MULAW_SILENCE);
            for frame in mulaw.chunks(FRAME_BYTES) {
                if cancel.is_cancelled() {
                    return Err(SpeakAbort::Cancelled);
                }
                self.send_frame(frame).await?;
                frames_sent += 1;
            }
        }

        Ok(frames_sent)
    }

    async fn send_frame(&self, mulaw: &[u8]) -> Result<(), SpeakAbort> {
        let payload = BASE64.encode(mulaw);
        match tokio::time::timeout(self.send_timeout, self.transport.send_media(&payload)).await {
            Ok(Ok(())) => {
                *self.progress.lock() = Instant::now();
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!("transport send failed: {e}");
                Err(SpeakAbort::Transport)
            }
            // Backpressure timeout aborts the sentence as if cancelled
            Err(_) => Err(SpeakAbort::Cancelled),
        }
    }
}

fn fade_in(samples: &mut [i16]) {
    let n = FADE_SAMPLES.min(samples.len());
    for i in 0..n {
        let factor = (i + 1) as f32 / n as f32;
        samples[i] = (samples[i] as f32 * factor) as i16;
    }
}

fn fade_out(samples: &mut [i16]) {
    let len = samples.len();
    let n = FADE_SAMPLES.min(len);
    for i in 0..n {
        let factor = 1.0 - (i + 1) as f32 / n as f32;
        samples[len - n + i] = (samples[len - n + i] as f32 * factor) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use voicegate_core::{Error, Result as CoreResult, TtsStream};

    struct FakeTts {
        /// PCM bytes (16 kHz linear16 LE) returned for every sentence
        chunks: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl TextToSpeech for FakeTts {
        async fn synthesize_stream(&self, _text: &str, _voice: &str) -> CoreResult<TtsStream> {
            let (tx, rx) = mpsc::channel(8);
            let chunks = self.chunks.clone();
            tokio::spawn(async move {
                for chunk in chunks {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            });
            Ok(TtsStream { audio: rx })
        }

        fn model_name(&self) -> &str {
            "fake-tts"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<String>>,
        fail_sends: AtomicBool,
    }

    #[async_trait]
    impl MediaTransport for RecordingTransport {
        async fn send_media(&self, payload: &str) -> CoreResult<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(Error::Transport("closed".to_string()));
            }
            self.frames.lock().push(payload.to_string());
            Ok(())
        }

        async fn send_clear(&self) -> CoreResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    fn pcm_chunk(samples: usize, value: i16) -> Vec<u8> {
        audio::pcm_to_le_bytes(&vec![value; samples])
    }

    fn make_streamer(
        tts_chunks: Vec<Vec<u8>>,
        transport: Arc<RecordingTransport>,
    ) -> (TtsStreamer, mpsc::Receiver<TtsNotice>) {
        let (notice_tx, notice_rx) = mpsc::channel(8);
        let streamer = TtsStreamer::new(
            Arc::new(FakeTts { chunks: tts_chunks }),
            transport,
            "voice".to_string(),
            notice_tx,
            Arc::new(Mutex::new(Instant::now())),
        );
        (streamer, notice_rx)
    }

    #[tokio::test]
    async fn test_sentence_produces_full_frames() {
        let transport = Arc::new(RecordingTransport::default());
        // 640 samples at 16k -> 320 at 8k -> 2 full frames
        let (streamer, _notices) = make_streamer(vec![pcm_chunk(640, 1000)], transport.clone());

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(streamer.run(rx));
        let cancel = CancellationToken::new();
        tx.send(SpeechItem::Sentence {
            text: "hi".to_string(),
            cancel: cancel.clone(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let frames = transport.frames.lock();
        assert_eq!(frames.len(), 2);
        for payload in frames.iter() {
            assert_eq!(BASE64.decode(payload).unwrap().len(), FRAME_BYTES);
        }
    }

    #[tokio::test]
    async fn test_residual_is_padded() {
        let transport = Arc::new(RecordingTransport::default());
        // 200 samples at 16k -> 100 at 8k -> one padded frame
        let (streamer, _notices) = make_streamer(vec![pcm_chunk(200, 500)], transport.clone());

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(streamer.run(rx));
        tx.send(SpeechItem::Sentence {
            text: "hi".to_string(),
            cancel: CancellationToken::new(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let frames = transport.frames.lock();
        assert_eq!(frames.len(), 1);
        let bytes = BASE64.decode(&frames[0]).unwrap();
        assert_eq!(bytes.len(), FRAME_BYTES);
        // Padding is µ-law silence
        assert_eq!(bytes[FRAME_BYTES - 1], MULAW_SILENCE);
    }

    #[tokio::test]
    async fn test_cancelled_item_is_skipped() {
        let transport = Arc::new(RecordingTransport::default());
        let (streamer, mut notices) = make_streamer(vec![pcm_chunk(640, 1000)], transport.clone());

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(streamer.run(rx));
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        tx.send(SpeechItem::Sentence {
            text: "skip me".to_string(),
            cancel: cancelled.clone(),
        })
        .await
        .unwrap();
        tx.send(SpeechItem::TurnComplete { cancel: cancelled }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(transport.frames.lock().is_empty());
        // Cancelled turn does not report drained
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_turn_complete_notifies_drained() {
        let transport = Arc::new(RecordingTransport::default());
        let (streamer, mut notices) = make_streamer(vec![pcm_chunk(320, 100)], transport);

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(streamer.run(rx));
        let cancel = CancellationToken::new();
        tx.send(SpeechItem::Sentence {
            text: "hello".to_string(),
            cancel: cancel.clone(),
        })
        .await
        .unwrap();
        tx.send(SpeechItem::TurnComplete { cancel }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(notices.recv().await, Some(TtsNotice::TurnDrained));
    }

    #[tokio::test]
    async fn test_transport_error_notice() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_sends.store(true, Ordering::SeqCst);
        let (streamer, mut notices) = make_streamer(vec![pcm_chunk(640, 1000)], transport);

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(streamer.run(rx));
        tx.send(SpeechItem::Sentence {
            text: "hello".to_string(),
            cancel: CancellationToken::new(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(notices.recv().await, Some(TtsNotice::TransportError));
    }

    #[test]
    fn test_fade_shapes() {
        let mut samples = vec![10_000i16; 320];
        fade_in(&mut samples);
        assert!(samples[0].abs() < 200);
        assert_eq!(samples[200], 10_000);

        let mut samples = vec![10_000i16; 320];
        fade_out(&mut samples);
        assert_eq!(samples[0], 10_000);
        assert_eq!(*samples.last().unwrap(), 0);
    }
}
