use crate::domain::ports::{PaymentJob, PaymentJobQueue};
use crate::error::{PayoutError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A bounded job queue backed by a `tokio::mpsc` channel.
///
/// The receiving half is handed to a [`PayoutWorker`](crate::application::worker::PayoutWorker).
#[derive(Clone)]
pub struct ChannelJobQueue {
    sender: mpsc::Sender<PaymentJob>,
}

impl ChannelJobQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PaymentJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl PaymentJobQueue for ChannelJobQueue {
    async fn push(&self, job: PaymentJob) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| PayoutError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{PayoutType, ProcessorType};
    use crate::domain::user::UserId;
    use chrono::NaiveDate;

    fn job() -> PaymentJob {
        PaymentJob {
            processor: ProcessorType::Stripe,
            date: NaiveDate::from_ymd_opt(2026, 10, 9).unwrap(),
            payout_type: PayoutType::Standard,
            user_ids: vec![UserId(1)],
        }
    }

    #[tokio::test]
    async fn test_channel_queue_delivers_jobs() {
        let (queue, mut rx) = ChannelJobQueue::channel(4);
        queue.push(job()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), job());
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_fails() {
        let (queue, rx) = ChannelJobQueue::channel(4);
        drop(rx);
        assert!(matches!(queue.push(job()).await, Err(PayoutError::QueueClosed)));
    }
}
