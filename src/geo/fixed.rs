//! Static position provider

use super::{GeoError, PositionProvider};
use crate::protocol::Position;
use async_trait::async_trait;

/// Reports one configured position, then waits forever
#[derive(Debug, Clone)]
pub struct FixedProvider {
    position: Position,
    delivered: bool,
}

impl FixedProvider {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            delivered: false,
        }
    }
}

#[async_trait]
impl PositionProvider for FixedProvider {
    async fn open(&mut self) -> Result<(), GeoError> {
        Ok(())
    }

    async fn next_fix(&mut self) -> Result<Position, GeoError> {
        if self.delivered {
            std::future::pending::<()>().await;
        }
        self.delivered = true;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_delivers_once_then_pends() {
        let position = Position::new(51.05, -114.07);
        let mut provider = FixedProvider::new(position);

        provider.open().await.unwrap();
        assert_eq!(provider.next_fix().await.unwrap(), position);

        let second = tokio::time::timeout(Duration::from_millis(20), provider.next_fix()).await;
        assert!(second.is_err(), "Second fix should never arrive");
    }
}
