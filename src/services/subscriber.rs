use crate::error::Result;
use crate::utils::spawn_shell;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Построчное чтение stdout подписчика
pub type LineReader = Lines<BufReader<ChildStdout>>;

/// Что сделал `ensure_running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberStatus {
    /// Процесса не было, запущен первый
    Spawned,
    /// Процесс жив
    Running,
    /// Прежний процесс завершился или был убран, запущена замена
    Respawned,
}

/// Единственный владелец процесса xkblayout-subscribe.
///
/// Процессом управляет только управляющая задача: запуск, проверка и kill.
/// Фоновый опрос получает лишь `LineReader` на время одного чтения и возвращает его.
/// Ожидание процесса, закрывшего поток, уходит в отдельную задачу (`reaper`).
pub struct SubscriberProcess {
    command: String,
    child: Option<Child>,
    reader: Option<LineReader>,
    reaper: Option<JoinHandle<()>>,
    spawn_count: u64,
}

impl SubscriberProcess {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
            reader: None,
            reaper: None,
            spawn_count: 0,
        }
    }

    /// Гарантирует живой процесс: запускает при первом вызове,
    /// перезапускает, если прежний уже завершился.
    pub fn ensure_running(&mut self) -> Result<SubscriberStatus> {
        let was_spawned = self.was_spawned();
        let exited = match self.child.as_mut() {
            None if was_spawned => {
                self.spawn()?;
                return Ok(SubscriberStatus::Respawned);
            }
            None => {
                self.spawn()?;
                return Ok(SubscriberStatus::Spawned);
            }
            Some(child) => child.try_wait()?,
        };

        match exited {
            None => Ok(SubscriberStatus::Running),
            Some(status) => {
                warn!("Подписчик '{}' завершился ({}), перезапускаем", self.command, status);
                self.reader = None;
                self.child = None;
                self.spawn()?;
                Ok(SubscriberStatus::Respawned)
            }
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let mut child = spawn_shell(&self.command)?;
        self.reader = child
            .stdout
            .take()
            .map(|stdout| BufReader::new(stdout).lines());
        self.spawn_count += 1;

        info!(
            "Подписчик '{}' запущен (pid: {:?}, запуск #{})",
            self.command,
            child.id(),
            self.spawn_count
        );

        self.child = Some(child);
        Ok(())
    }

    /// Забрать поток для фонового чтения. None - у процесса нет stdout
    /// или поток уже выдан.
    pub fn take_reader(&mut self) -> Option<LineReader> {
        self.reader.take()
    }

    pub fn restore_reader(&mut self, reader: LineReader) {
        self.reader = Some(reader);
    }

    /// Убрать процесс, закрывший поток. Управляющая задача не ждёт:
    /// ожидание до `timeout` и kill выполняет фоновая задача.
    /// Следующий `ensure_running` запустит замену.
    pub fn reap(&mut self, timeout: Duration) {
        self.reader = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Подписчик '{}' завершился: {}", self.command, status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Не удалось проверить подписчика '{}': {}", self.command, e),
        }

        let command = self.command.clone();
        let reaper = tokio::spawn(async move {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("Подписчик '{}' завершился: {}", command, status),
                Ok(Err(e)) => warn!("Не удалось дождаться подписчика '{}': {}", command, e),
                Err(_) => {
                    warn!(
                        "Подписчик '{}' закрыл поток, но не завершился за {:?}, убиваем",
                        command, timeout
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Не удалось убить подписчика '{}': {}", command, e);
                    }
                }
            }
        });

        // прежний reaper при отмене роняет Child, kill_on_drop убивает процесс
        if let Some(previous) = self.reaper.replace(reaper) {
            previous.abort();
        }
    }

    /// Принудительно завершить процесс (teardown)
    pub async fn kill(&mut self) {
        self.reader = None;
        if let Some(reaper) = self.reaper.take() {
            if !reaper.is_finished() {
                debug!("Отмена ожидания прежнего подписчика '{}'", self.command);
                reaper.abort();
            }
        }
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Подписчик '{}' уже завершён: {}", self.command, status);
            }
            _ => {
                if let Err(e) = child.kill().await {
                    warn!("Не удалось убить подписчика '{}': {}", self.command, e);
                } else {
                    info!("Подписчик '{}' остановлен", self.command);
                }
            }
        }
    }

    /// Запускался ли процесс хотя бы раз
    pub fn was_spawned(&self) -> bool {
        self.spawn_count > 0
    }

    #[allow(dead_code)]
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count
    }

    #[allow(dead_code)]
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }
}

/// Прочитать следующую непустую строку. `Ok(None)` - поток закрыт.
pub async fn read_state_line(reader: &mut LineReader) -> Result<Option<String>> {
    loop {
        match reader.next_line().await? {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some(line.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_spawn_and_read() {
        let mut subscriber = SubscriberProcess::new("printf '1\\n\\n0\\n'");
        assert!(!subscriber.was_spawned());

        assert_eq!(subscriber.ensure_running().unwrap(), SubscriberStatus::Spawned);
        let mut reader = subscriber.take_reader().unwrap();
        assert!(subscriber.take_reader().is_none());

        assert_eq!(read_state_line(&mut reader).await.unwrap(), Some("1".to_string()));
        // пустая строка посреди потока пропускается
        assert_eq!(read_state_line(&mut reader).await.unwrap(), Some("0".to_string()));
        assert_eq!(read_state_line(&mut reader).await.unwrap(), None);

        subscriber.reap(Duration::from_secs(5));
        assert!(!subscriber.is_running());
    }

    #[tokio::test]
    async fn test_exited_process_is_respawned() {
        let mut subscriber = SubscriberProcess::new("exit 0");
        subscriber.ensure_running().unwrap();
        subscriber.reap(Duration::from_secs(5));

        assert_eq!(subscriber.ensure_running().unwrap(), SubscriberStatus::Respawned);
        assert_eq!(subscriber.spawn_count(), 2);
    }

    fn is_gone(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map(|stat| stat.contains(") Z"))
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_reap_does_not_block_caller() {
        let mut subscriber = SubscriberProcess::new("exec 1>&-; exec sleep 30");
        subscriber.ensure_running().unwrap();
        let pid = subscriber.pid().unwrap();

        let started = std::time::Instant::now();
        subscriber.reap(Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(subscriber.pid().is_none());
        assert!(subscriber.take_reader().is_none());

        // процесс, не завершившийся за таймаут, убивается фоновой задачей
        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while !is_gone(pid) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(gone.is_ok());
    }

    #[tokio::test]
    async fn test_kill_cancels_pending_reap() {
        let mut subscriber = SubscriberProcess::new("exec 1>&-; exec sleep 30");
        subscriber.ensure_running().unwrap();
        let pid = subscriber.pid().unwrap();

        subscriber.reap(Duration::from_secs(30));
        subscriber.kill().await;

        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while !is_gone(pid) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(gone.is_ok());
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let mut subscriber = SubscriberProcess::new("sleep 30");
        subscriber.ensure_running().unwrap();
        assert!(subscriber.is_running());
        assert!(subscriber.pid().is_some());

        subscriber.kill().await;
        assert!(!subscriber.is_running());
        assert!(subscriber.was_spawned());
    }

    #[tokio::test]
    async fn test_kill_without_process_is_noop() {
        let mut subscriber = SubscriberProcess::new("sleep 30");
        subscriber.kill().await;
        assert!(!subscriber.was_spawned());
    }
}
