//! Sentence segmentation and the speech synthesis pipeline
//!
//! The pipeline is a single-consumer queue: sentences go in, audio frames
//! go out to the telephony sink, strictly one sentence in flight at a time
//! so audio never interleaves. Each AI turn gets a fresh cancellation
//! token; barge-in cancels the token and drains the queue, and the
//! consumer checks the token at every suspension point so cancellation
//! lands before the next audio frame, not merely before the next sentence.

pub mod provider;
pub mod segmenter;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::telephony::TelephonySink;

pub use provider::{SpeechSource, Synthesizer};
pub use segmenter::{split_sentences, SentenceBuffer};

/// Signal from the pipeline back to the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineSignal {
    /// The queue drained after the final sentence with no cancellation:
    /// the AI has finished speaking
    Drained,
}

struct PipelineShared {
    queue: Mutex<VecDeque<String>>,
    turn: Mutex<CancellationToken>,
    /// Set when the response text stream ended; gates the drained signal
    final_seen: AtomicBool,
    notify: Notify,
}

impl PipelineShared {
    fn pop(&self) -> Option<String> {
        self.queue.lock().expect("queue lock").pop_front()
    }

    fn turn_token(&self) -> CancellationToken {
        self.turn.lock().expect("turn lock").clone()
    }

    /// Consume the drained condition: queue empty, final marked, turn alive
    fn take_drained(&self) -> bool {
        let empty = self.queue.lock().expect("queue lock").is_empty();
        if empty && !self.turn_token().is_cancelled() {
            self.final_seen.swap(false, Ordering::AcqRel)
        } else {
            false
        }
    }
}

/// Per-call speech synthesis pipeline
pub struct SynthPipeline {
    shared: Arc<PipelineShared>,
}

impl SynthPipeline {
    /// Spawn the consumer task for one call
    ///
    /// The consumer lives until `call_token` is cancelled. `signals`
    /// receives [`PipelineSignal::Drained`] when a turn's audio has been
    /// fully delivered.
    #[must_use]
    pub fn spawn(
        source: Arc<dyn SpeechSource>,
        sink: TelephonySink,
        signals: mpsc::Sender<PipelineSignal>,
        call_token: CancellationToken,
    ) -> Self {
        let shared = Arc::new(PipelineShared {
            queue: Mutex::new(VecDeque::new()),
            turn: Mutex::new(CancellationToken::new()),
            final_seen: AtomicBool::new(false),
            notify: Notify::new(),
        });

        let consumer = Arc::clone(&shared);
        tokio::spawn(async move {
            consume(consumer, source, sink, signals, call_token).await;
        });

        Self { shared }
    }

    /// Queue one sentence for synthesis, waking the consumer
    pub fn enqueue(&self, sentence: String) {
        self.shared
            .queue
            .lock()
            .expect("queue lock")
            .push_back(sentence);
        self.shared.notify.notify_one();
    }

    /// Start a fresh AI turn: new cancellation token, empty queue
    pub fn begin_turn(&self) {
        {
            let mut turn = self.shared.turn.lock().expect("turn lock");
            *turn = CancellationToken::new();
        }
        self.shared.queue.lock().expect("queue lock").clear();
        self.shared.final_seen.store(false, Ordering::Release);
    }

    /// Cancel the current turn: abort in-flight synthesis and drop every
    /// queued sentence. Idempotent.
    pub fn cancel_turn(&self) {
        self.shared.turn.lock().expect("turn lock").cancel();
        self.shared.queue.lock().expect("queue lock").clear();
        self.shared.final_seen.store(false, Ordering::Release);
    }

    /// Mark the response text stream as complete; once the queue empties
    /// the pipeline signals that the AI finished speaking
    pub fn mark_final(&self) {
        self.shared.final_seen.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Number of sentences waiting to be synthesized
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().expect("queue lock").len()
    }
}

/// Single consumer loop: exactly zero or one sentence in flight per call
async fn consume(
    shared: Arc<PipelineShared>,
    source: Arc<dyn SpeechSource>,
    sink: TelephonySink,
    signals: mpsc::Sender<PipelineSignal>,
    call_token: CancellationToken,
) {
    loop {
        // Wait for a sentence, a drain condition, or call teardown
        let sentence = loop {
            if call_token.is_cancelled() {
                return;
            }
            if let Some(s) = shared.pop() {
                break s;
            }
            if shared.take_drained() {
                if signals.send(PipelineSignal::Drained).await.is_err() {
                    return;
                }
                continue;
            }
            tokio::select! {
                () = shared.notify.notified() => {}
                () = call_token.cancelled() => return,
            }
        };

        let token = shared.turn_token();
        if token.is_cancelled() {
            continue;
        }

        // One provider failure skips one sentence, never the call
        if let Err(e) = source.stream_to(&sentence, &sink, &token).await {
            tracing::warn!(error = %e, "synthesis failed, skipping sentence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::telephony::OutboundFrame;
    use crate::Result;

    /// Fake provider that emits `chunks` audio frames per sentence with a
    /// small pause between them, honoring cancellation like the real one
    struct FakeSource {
        chunks: usize,
        chunk_delay: Duration,
    }

    #[async_trait]
    impl SpeechSource for FakeSource {
        async fn stream_to(
            &self,
            text: &str,
            sink: &TelephonySink,
            cancel: &CancellationToken,
        ) -> Result<()> {
            for i in 0..self.chunks {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    () = tokio::time::sleep(self.chunk_delay) => {}
                }
                let payload = format!("{text}#{i}");
                if sink.send_audio(&payload).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }

    /// Provider that always fails, for skip-and-continue behavior
    struct FailingSource;

    #[async_trait]
    impl SpeechSource for FailingSource {
        async fn stream_to(
            &self,
            _text: &str,
            _sink: &TelephonySink,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            Err(crate::Error::Synthesis("provider down".to_string()))
        }
    }

    fn setup(
        source: Arc<dyn SpeechSource>,
    ) -> (
        SynthPipeline,
        mpsc::Receiver<OutboundFrame>,
        mpsc::Receiver<PipelineSignal>,
        CancellationToken,
    ) {
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (signal_tx, signal_rx) = mpsc::channel(4);
        let call_token = CancellationToken::new();
        let sink = TelephonySink::new("MZ1".to_string(), frame_tx);
        let pipeline = SynthPipeline::spawn(source, sink, signal_tx, call_token.clone());
        (pipeline, frame_rx, signal_rx, call_token)
    }

    fn payload(frame: &OutboundFrame) -> String {
        match frame {
            OutboundFrame::Media { media, .. } => media.payload.clone(),
            OutboundFrame::Clear { .. } => panic!("unexpected clear"),
        }
    }

    #[tokio::test]
    async fn sentences_play_sequentially_in_order() {
        let (pipeline, mut frames, mut signals, token) = setup(Arc::new(FakeSource {
            chunks: 2,
            chunk_delay: Duration::from_millis(1),
        }));

        pipeline.begin_turn();
        pipeline.enqueue("Um.".to_string());
        pipeline.enqueue("Dois.".to_string());
        pipeline.mark_final();

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(payload(&frames.recv().await.unwrap()));
        }
        assert_eq!(received, vec!["Um.#0", "Um.#1", "Dois.#0", "Dois.#1"]);

        assert_eq!(signals.recv().await, Some(PipelineSignal::Drained));
        token.cancel();
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_frame() {
        let (pipeline, mut frames, _signals, token) = setup(Arc::new(FakeSource {
            chunks: 50,
            chunk_delay: Duration::from_millis(20),
        }));

        pipeline.begin_turn();
        pipeline.enqueue("Frase longa.".to_string());
        pipeline.enqueue("Nunca falada.".to_string());

        // Let a couple of frames through, then barge in
        let first = frames.recv().await.unwrap();
        assert_eq!(payload(&first), "Frase longa.#0");
        pipeline.cancel_turn();
        assert_eq!(pipeline.queue_len(), 0);

        // At most one frame may already be in the channel from the race;
        // after that the line stays silent
        tokio::time::sleep(Duration::from_millis(60)).await;
        let mut late = 0;
        while let Ok(frame) = frames.try_recv() {
            assert!(payload(&frame).starts_with("Frase longa."), "queued sentence leaked");
            late += 1;
        }
        assert!(late <= 1, "audio kept flowing after cancellation: {late} frames");
        token.cancel();
    }

    #[tokio::test]
    async fn no_drained_signal_after_cancellation() {
        let (pipeline, mut frames, mut signals, token) = setup(Arc::new(FakeSource {
            chunks: 3,
            chunk_delay: Duration::from_millis(20),
        }));

        pipeline.begin_turn();
        pipeline.enqueue("Uma frase.".to_string());
        pipeline.mark_final();
        // Cancel while the sentence is still mid-stream
        let _ = frames.recv().await;
        pipeline.cancel_turn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(signals.try_recv().is_err(), "drained fired for a cancelled turn");
        token.cancel();
    }

    #[tokio::test]
    async fn provider_failure_skips_sentence_and_continues() {
        let (pipeline, _frames, mut signals, token) = setup(Arc::new(FailingSource));

        pipeline.begin_turn();
        pipeline.enqueue("Primeira.".to_string());
        pipeline.enqueue("Segunda.".to_string());
        pipeline.mark_final();

        // Both sentences fail but the turn still completes
        assert_eq!(signals.recv().await, Some(PipelineSignal::Drained));
        token.cancel();
    }

    #[tokio::test]
    async fn empty_turn_still_drains() {
        let (pipeline, _frames, mut signals, token) = setup(Arc::new(FakeSource {
            chunks: 1,
            chunk_delay: Duration::from_millis(1),
        }));

        pipeline.begin_turn();
        pipeline.mark_final();
        assert_eq!(signals.recv().await, Some(PipelineSignal::Drained));
        token.cancel();
    }

    #[tokio::test]
    async fn fresh_turn_after_barge_in_plays_again() {
        let (pipeline, mut frames, mut signals, token) = setup(Arc::new(FakeSource {
            chunks: 1,
            chunk_delay: Duration::from_millis(1),
        }));

        pipeline.begin_turn();
        pipeline.enqueue("Velha.".to_string());
        pipeline.cancel_turn();

        pipeline.begin_turn();
        pipeline.enqueue("Nova.".to_string());
        pipeline.mark_final();

        // Only the new turn's audio arrives
        let frame = frames.recv().await.unwrap();
        assert_eq!(payload(&frame), "Nova.#0");
        assert_eq!(signals.recv().await, Some(PipelineSignal::Drained));
        token.cancel();
    }
}
