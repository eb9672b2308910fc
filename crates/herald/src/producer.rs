use crate::hub::Hub;
use herald_common::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Broadcast one message per input line until EOF.
///
/// Line terminators (`\n` or `\r\n`) are stripped; blank lines are broadcast
/// as empty messages. Returns the number of lines sent.
///
/// # Errors
///
/// Returns the first read error from `reader`.
pub async fn pump_lines<R>(reader: R, hub: &Hub) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0u64;
    while let Some(line) = lines.next_line().await? {
        hub.broadcast(Message::new(line)).await;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::{channel_conn, received};
    use tokio::time::Duration;

    #[tokio::test]
    async fn each_line_becomes_one_broadcast() {
        let hub = Hub::new(true, Duration::from_secs(1));
        let (conn, mut rx) = channel_conn(1);
        let _ = hub.add(conn);

        let input: &[u8] = b"first\r\nsecond\n\nlast";
        let sent = pump_lines(input, &hub).await.unwrap();

        assert_eq!(sent, 4);
        let got: Vec<String> = received(&mut rx).into_iter().map(|m| m.content).collect();
        assert_eq!(got, vec!["first", "second", "", "last"]);
        assert_eq!(hub.last_message(), Some(Message::new("last")));
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let hub = Hub::new(true, Duration::from_secs(1));
        let input: &[u8] = b"";
        assert_eq!(pump_lines(input, &hub).await.unwrap(), 0);
        assert_eq!(hub.last_message(), None);
    }
}
