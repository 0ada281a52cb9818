//! コマンドをキューエンジンへ振り分け、結果を掲示板へ流す

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandKind};
use crate::queue::{DurableStore, MessageBoard, TicketMaster};

pub struct Dispatcher<S> {
    master: Arc<TicketMaster<S>>,
    board: Arc<MessageBoard>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            master: Arc::clone(&self.master),
            board: Arc::clone(&self.board),
        }
    }
}

impl<S: DurableStore + 'static> Dispatcher<S> {
    pub fn new(master: Arc<TicketMaster<S>>, board: Arc<MessageBoard>) -> Self {
        Self { master, board }
    }

    /// 1件のコマンドを処理し、結果を掲示板に書く
    ///
    /// 選曲とチェックポイント保存を含むので同期的にブロックする。
    /// エラーは掲示板に出したものと同じ文言で返す。
    pub fn handle(&self, command: Command) -> Result<String, String> {
        let Command {
            kind,
            actor,
            argument,
            index,
        } = command;

        let result = match kind {
            CommandKind::Pick => self.master.add_ticket(&actor, &argument),
            CommandKind::Finish => self.master.finish_ticket(&actor, index),
            CommandKind::NextLevel => self.master.next_level(&actor, index),
            CommandKind::NextRank => self.master.next_rank(&actor, index),
            CommandKind::Clear => self.master.clear_tickets(&actor),
        };

        match result {
            Ok(status) => {
                self.board.push(format!("inf {} {}", actor, status));
                Ok(status)
            }
            Err(e) => {
                let reason = String::from(e);
                log::debug!("Command {:?} from {} failed: {}", kind, actor, reason);
                self.board.push(format!("err {} {}", actor, reason));
                Err(reason)
            }
        }
    }

    /// 受信したコマンドをキャンセルされるまで1件ずつ処理する
    ///
    /// 各コマンドはブロッキング用スレッドで実行する。
    pub async fn run(&self, mut commands: mpsc::Receiver<Command>, cancel: &CancellationToken) {
        log::info!("Dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    let Some(command) = command else {
                        log::info!("Command channel closed");
                        break;
                    };
                    let dispatcher = self.clone();
                    // エラーは掲示板に出しているので、ここでは捨てる
                    if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.handle(command)).await {
                        log::error!("Command handler panicked: {}", e);
                    }
                }
            }
        }
        log::info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maimai::{AliasList, AliasRecord, Catalogue, CatalogueEntry, Level};
    use crate::queue::{MemoryStore, QueueConfig};
    use std::time::Duration;

    fn dispatcher(max_size: usize) -> Dispatcher<MemoryStore> {
        let entry = CatalogueEntry {
            id: 70,
            title: "Night of Nights".to_string(),
            image_path: "70.png".to_string(),
            category: "东方Project".to_string(),
            levels: vec![
                Level {
                    track_type: "std".to_string(),
                    difficulty: "bas".to_string(),
                    level: "7".to_string(),
                },
                Level {
                    track_type: "std".to_string(),
                    difficulty: "adv".to_string(),
                    level: "9".to_string(),
                },
            ],
            aliases: Vec::new(),
        };
        let catalogue = Catalogue::new(
            vec![entry],
            AliasList {
                aliases: vec![AliasRecord {
                    song_id: 70,
                    aliases: vec!["夜骑".to_string()],
                }],
            },
        );
        let config = QueueConfig {
            max_size,
            ..QueueConfig::default()
        };
        let master = TicketMaster::new(Arc::new(catalogue), MemoryStore::new(), config).unwrap();
        Dispatcher::new(Arc::new(master), Arc::new(MessageBoard::new(10, chrono::Duration::seconds(10))))
    }

    fn board(d: &Dispatcher<MemoryStore>) -> Vec<String> {
        d.board.messages().into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn test_routes_commands_and_reports() {
        let d = dispatcher(1);

        d.handle(Command::pick("alice", "夜骑")).unwrap();
        // 返すエラー文言は掲示板と同じ
        assert_eq!(d.handle(Command::pick("bob", "夜骑")).unwrap_err(), "歌单已满~");
        d.handle(Command::targeted(CommandKind::NextLevel, "alice", None))
            .unwrap();
        assert_eq!(d.master.snapshot()[0].level_index, 1);

        assert!(d.handle(Command::targeted(CommandKind::Clear, "alice", None)).is_err());
        d.handle(Command::targeted(CommandKind::Finish, "alice", Some(0)))
            .unwrap();
        assert!(d.master.is_empty());

        assert_eq!(
            board(&d),
            vec![
                "inf alice 关闭成功",
                "err alice 只能操作自己点的歌曲",
                "inf alice 切换成功",
                "err bob 歌单已满~",
                "inf alice 成功！",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_until_channel_closed() {
        let d = dispatcher(12);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(Command::pick("alice", "夜骑")).await.unwrap();
        tx.send(Command::targeted(CommandKind::NextRank, "alice", None))
            .await
            .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), d.run(rx, &cancel))
            .await
            .unwrap();
        assert_eq!(d.master.len(), 1);
        // 受信順に1件ずつ処理される
        assert_eq!(board(&d), vec!["inf alice 切换成功", "inf alice 成功！"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let d = dispatcher(12);
        let (_tx, rx) = mpsc::channel::<Command>(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), d.run(rx, &cancel))
            .await
            .unwrap();
    }
}
