//! Control commands implementation
//! This module contains the messages the control screen sends to the peripheral:
//! the mode toggle and the slider offset. Payloads are plain text.

use anyhow::{Result, anyhow};
use log::info;

use crate::core::bluetooth::transport::MessageTransport;

/// Control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Toggle switch state ("ON" / "OFF")
    Mode(bool),
    /// Slider offset, as a signed decimal
    Offset(i32),
}

impl ControlCommand {
    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Mode(true) => b"ON".to_vec(),
            Self::Mode(false) => b"OFF".to_vec(),
            Self::Offset(value) => value.to_string().into_bytes(),
        }
    }
}

/// Command sender trait
#[async_trait::async_trait]
pub trait CommandSender {
    /// Send a command to the peripheral
    async fn send_command(&self, command: ControlCommand) -> Result<()>;
}

#[async_trait::async_trait]
impl CommandSender for MessageTransport {
    async fn send_command(&self, command: ControlCommand) -> Result<()> {
        info!("Sending command to peripheral: {:?}", command);
        self.send(&command.to_bytes())?;
        Ok(())
    }
}

/// Slider model over a fixed list of offsets
#[derive(Debug, Clone)]
pub struct OffsetSelector {
    steps: Vec<i32>,
    position: usize,
}

impl OffsetSelector {
    pub fn new(steps: Vec<i32>) -> Result<Self> {
        if steps.is_empty() {
            return Err(anyhow!("Offset steps must not be empty"));
        }
        let mut selector = Self { steps, position: 0 };
        selector.reset();
        Ok(selector)
    }

    pub fn steps(&self) -> &[i32] {
        &self.steps
    }

    pub fn value(&self) -> i32 {
        self.steps[self.position]
    }

    /// Moves the slider to `index`
    pub fn select(&mut self, index: usize) -> Result<i32> {
        if index >= self.steps.len() {
            return Err(anyhow!(
                "Slider position {} out of range 0..{}",
                index,
                self.steps.len()
            ));
        }
        self.position = index;
        Ok(self.value())
    }

    /// Moves the slider to 0, or to the middle when 0 is not a step
    pub fn reset(&mut self) {
        self.position = self
            .steps
            .iter()
            .position(|&v| v == 0)
            .unwrap_or(self.steps.len() / 2);
    }

    pub fn contains(&self, value: i32) -> bool {
        self.steps.contains(&value)
    }
}

/// Command executor for the peripheral
pub struct CommandExecutor<T: CommandSender> {
    command_sender: T,
    offsets: OffsetSelector,
}

impl<T: CommandSender> CommandExecutor<T> {
    /// Create a new CommandExecutor
    pub fn new(command_sender: T, offsets: OffsetSelector) -> Self {
        Self {
            command_sender,
            offsets,
        }
    }

    pub fn offsets(&self) -> &OffsetSelector {
        &self.offsets
    }

    /// Sends the toggle state
    pub async fn set_mode(&self, on: bool) -> Result<()> {
        info!("Mode changed to {}", if on { "ON" } else { "OFF" });
        self.command_sender
            .send_command(ControlCommand::Mode(on))
            .await
    }

    /// Sends one of the configured offsets
    pub async fn send_offset(&mut self, value: i32) -> Result<()> {
        let index = self
            .offsets
            .steps()
            .iter()
            .position(|&v| v == value)
            .ok_or_else(|| anyhow!("Invalid offset {}, expected one of {:?}", value, self.offsets.steps()))?;
        self.offsets.select(index)?;
        self.command_sender
            .send_command(ControlCommand::Offset(value))
            .await
    }

    /// Sends the currently selected slider value
    pub async fn send_selected(&self) -> Result<()> {
        self.command_sender
            .send_command(ControlCommand::Offset(self.offsets.value()))
            .await
    }

    /// Moves the slider back to its reset position. Nothing is sent.
    pub fn reset_offset(&mut self) -> i32 {
        self.offsets.reset();
        info!("Offset reset to {}", self.offsets.value());
        self.offsets.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl CommandSender for RecordingSender {
        async fn send_command(&self, command: ControlCommand) -> Result<()> {
            self.sent.lock().unwrap().push(command.to_bytes());
            Ok(())
        }
    }

    fn executor() -> (CommandExecutor<RecordingSender>, RecordingSender) {
        let sender = RecordingSender::default();
        let offsets = OffsetSelector::new(vec![-30, -15, 0, 15, 30]).unwrap();
        (CommandExecutor::new(sender.clone(), offsets), sender)
    }

    #[test]
    fn command_encoding() {
        assert_eq!(ControlCommand::Mode(true).to_bytes(), b"ON");
        assert_eq!(ControlCommand::Mode(false).to_bytes(), b"OFF");
        assert_eq!(ControlCommand::Offset(-15).to_bytes(), b"-15");
        assert_eq!(ControlCommand::Offset(30).to_bytes(), b"30");
    }

    #[test]
    fn selector_starts_and_resets_at_zero() {
        let mut selector = OffsetSelector::new(vec![-30, -15, 0, 15, 30]).unwrap();
        assert_eq!(selector.value(), 0);
        assert_eq!(selector.select(4).unwrap(), 30);
        assert!(selector.select(5).is_err());
        selector.reset();
        assert_eq!(selector.value(), 0);

        let selector = OffsetSelector::new(vec![10, 20, 30]).unwrap();
        assert_eq!(selector.value(), 20);
        assert!(OffsetSelector::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn executor_sends_mode_and_offsets() {
        let (mut executor, sender) = executor();

        executor.set_mode(true).await.unwrap();
        executor.send_offset(-15).await.unwrap();
        assert!(executor.send_offset(7).await.is_err());
        assert_eq!(executor.offsets().value(), -15);

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![b"ON".to_vec(), b"-15".to_vec()]);
    }

    #[tokio::test]
    async fn reset_moves_the_slider_without_sending() {
        let (mut executor, sender) = executor();

        executor.send_offset(30).await.unwrap();
        assert_eq!(executor.reset_offset(), 0);
        assert_eq!(executor.offsets().value(), 0);
        assert_eq!(*sender.sent.lock().unwrap(), vec![b"30".to_vec()]);

        // The next explicit send carries the reset value
        executor.send_selected().await.unwrap();
        assert_eq!(*sender.sent.lock().unwrap(), vec![b"30".to_vec(), b"0".to_vec()]);
    }
}
