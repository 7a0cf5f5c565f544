use crate::config::{Config, FailurePolicy};
use crate::debug_if_enabled;
use crate::error::{IndicatorError, Result};
use crate::events::{IndicatorState, LifecycleHook, NoUpdateReason, PollOutcome};
use crate::services::display_sink::DisplaySink;
use crate::services::layout_source::LayoutSourceTrait;
use crate::services::layout_table::{LayoutLabeler, LayoutTable};
use crate::services::subscriber::{read_state_line, LineReader, SubscriberProcess, SubscriberStatus};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

/// Состояние, видимое хосту через `IndicatorHandle`
#[derive(Debug)]
struct SharedStatus {
    state: IndicatorState,
    label: Option<String>,
}

/// Хуки жизненного цикла, которые вызывает хост
#[derive(Clone)]
pub struct IndicatorHandle {
    hooks: mpsc::Sender<LifecycleHook>,
    status: Arc<RwLock<SharedStatus>>,
}

impl IndicatorHandle {
    /// Хост собирается перезапустить или переконфигурировать виджет
    pub async fn on_teardown_requested(&self) {
        if self.hooks.send(LifecycleHook::Teardown).await.is_err() {
            debug_if_enabled!("Индикатор уже завершён, teardown не нужен");
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.status.read().state
    }

    pub fn current_label(&self) -> Option<String> {
        self.status.read().label.clone()
    }
}

/// Единственный незавершённый опрос
struct PendingPoll {
    handle: JoinHandle<PollCompletion>,
}

/// Результат фонового чтения; поток возвращается управляющей задаче
struct PollCompletion {
    reader: Option<LineReader>,
    result: Result<PollOutcome>,
}

/// Подготовленная работа для фоновой задачи
enum PollJob {
    Ready(PollOutcome),
    Failed(IndicatorError),
    Read {
        reader: LineReader,
        labeler: Arc<LayoutLabeler>,
    },
}

impl PollJob {
    async fn run(self) -> PollCompletion {
        match self {
            PollJob::Ready(outcome) => PollCompletion {
                reader: None,
                result: Ok(outcome),
            },
            PollJob::Failed(e) => PollCompletion {
                reader: None,
                result: Err(e),
            },
            PollJob::Read { mut reader, labeler } => match read_state_line(&mut reader).await {
                Ok(Some(line)) => PollCompletion {
                    result: labeler.label_for_state(&line).map(PollOutcome::Label),
                    reader: Some(reader),
                },
                Ok(None) => PollCompletion {
                    reader: None,
                    result: Ok(PollOutcome::NoUpdate(NoUpdateReason::StreamClosed)),
                },
                Err(e) => PollCompletion {
                    reader: Some(reader),
                    result: Err(e),
                },
            },
        }
    }
}

/// Индикатор раскладки: подписка на xkblayout-subscribe и публикация метки.
///
/// Всё состояние принадлежит управляющей задаче (`run`). В фон уходит только
/// блокирующее чтение одной строки, и одновременно в полёте не больше одного опроса.
pub struct KeyboardLayoutIndicator {
    config: Arc<Config>,
    source: Box<dyn LayoutSourceTrait>,
    sink: Box<dyn DisplaySink>,
    labeler: Arc<LayoutLabeler>,
    subscriber: SubscriberProcess,
    pending: Option<PendingPoll>,
    next_poll_at: Option<Instant>,
    backoff: Duration,
    status: Arc<RwLock<SharedStatus>>,
}

impl KeyboardLayoutIndicator {
    pub fn new(
        config: Arc<Config>,
        source: Box<dyn LayoutSourceTrait>,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        let subscriber = SubscriberProcess::new(source.subscribe_command());
        let labeler = LayoutLabeler::new(LayoutTable::default(), config.layout.display_map.clone());
        let backoff = config.poll.retry_backoff();

        info!("Инициализация KeyboardLayoutIndicator (подписчик: '{}')", source.subscribe_command());

        Self {
            config,
            source,
            sink,
            labeler: Arc::new(labeler),
            subscriber,
            pending: None,
            next_poll_at: None,
            backoff,
            status: Arc::new(RwLock::new(SharedStatus {
                state: IndicatorState::Uninitialized,
                label: None,
            })),
        }
    }

    /// Канал хуков для хоста. Закрытие всех хендлов тоже означает teardown.
    pub fn handle(&self) -> (IndicatorHandle, mpsc::Receiver<LifecycleHook>) {
        let (tx, rx) = mpsc::channel(4);
        let handle = IndicatorHandle {
            hooks: tx,
            status: Arc::clone(&self.status),
        };
        (handle, rx)
    }

    pub fn state(&self) -> IndicatorState {
        self.status.read().state
    }

    fn set_state(&self, state: IndicatorState) {
        let mut status = self.status.write();
        if status.state != state {
            debug_if_enabled!("Индикатор: {} -> {}", status.state, state);
            status.state = state;
        }
    }

    fn push_label(&mut self, label: &str) -> Result<()> {
        self.sink.push_label(label)?;
        self.status.write().label = Some(label.to_string());
        Ok(())
    }

    /// Перечитать список раскладок (`print %S`)
    pub async fn refresh_layout_table(&mut self) -> Result<()> {
        let table = self.source.list_layouts().await?;
        if table.is_empty() {
            warn!("Список раскладок пуст, будут показаны числовые индексы");
        } else {
            info!("Загружено раскладок: {}", table.len());
        }
        Arc::make_mut(&mut self.labeler).replace_table(table);
        Ok(())
    }

    /// Синхронный запрос текущей раскладки (`print %c`) и немедленный показ
    pub async fn query_current_state(&mut self) -> Result<String> {
        let index = self.source.current_index().await?;
        let label = self.labeler.display_label(index);
        self.push_label(&label)?;
        info!("Текущая раскладка: {}", label);
        Ok(label)
    }

    /// Заглушка, таблица раскладок и начальная метка
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state().is_stopped() {
            return Err(IndicatorError::Stopped);
        }

        let placeholder = self.config.display.placeholder.clone();
        self.push_label(&placeholder)?;

        // без списка раскладок виджет продолжает работу с числовыми индексами
        if let Err(e) = self.refresh_layout_table().await {
            error!("Не удалось получить список раскладок, будут показаны индексы: {}", e);
        }

        if let Err(e) = self.query_current_state().await {
            error!("Не удалось получить текущую раскладку: {}", e);
        }

        self.set_state(IndicatorState::Initialized);
        Ok(())
    }

    /// Управляющая часть опроса: проверка подписчика и выдача потока
    fn prepare_poll(&mut self) -> Result<PollJob> {
        match self.subscriber.ensure_running()? {
            SubscriberStatus::Respawned => {
                return Ok(PollJob::Ready(PollOutcome::NoUpdate(NoUpdateReason::Respawned)));
            }
            SubscriberStatus::Spawned | SubscriberStatus::Running => {}
        }

        match self.subscriber.take_reader() {
            Some(reader) => Ok(PollJob::Read {
                reader,
                labeler: Arc::clone(&self.labeler),
            }),
            None => Ok(PollJob::Ready(PollOutcome::NoUpdate(NoUpdateReason::NoStream))),
        }
    }

    /// Возврат потока и уборка процесса после завершения чтения
    fn finish_poll(&mut self, completion: PollCompletion) -> Result<PollOutcome> {
        if let Some(reader) = completion.reader {
            self.subscriber.restore_reader(reader);
        }

        if let Ok(PollOutcome::NoUpdate(NoUpdateReason::StreamClosed)) = &completion.result {
            self.subscriber.reap(self.config.poll.reap_timeout());
        }

        completion.result
    }

    /// Один опрос целиком в текущей задаче. Может ждать сколь угодно долго.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        if self.pending.is_some() {
            return Err(IndicatorError::PollInFlight);
        }
        let job = self.prepare_poll()?;
        let completion = job.run().await;
        self.finish_poll(completion)
    }

    /// Отправить опрос в фоновую задачу
    pub fn schedule_next_poll(&mut self) -> Result<()> {
        if self.state().is_stopped() {
            return Err(IndicatorError::Stopped);
        }
        if self.pending.is_some() {
            return Err(IndicatorError::PollInFlight);
        }

        // ошибка запуска подписчика доходит до обработчика как неудачный опрос
        let job = self.prepare_poll().unwrap_or_else(PollJob::Failed);
        let handle = tokio::spawn(job.run());
        self.pending = Some(PendingPoll { handle });
        self.set_state(IndicatorState::Subscribed);
        Ok(())
    }

    fn reschedule_after(&mut self, delay: Option<Duration>) {
        let now = Instant::now();
        self.next_poll_at = Some(delay.map_or(now, |d| now + d));
    }

    /// Обработчик завершения опроса, выполняется в управляющей задаче
    fn on_poll_done(&mut self, joined: std::result::Result<PollCompletion, JoinError>) {
        let completion = match joined {
            Ok(completion) => completion,
            Err(e) if e.is_cancelled() => {
                debug_if_enabled!("Опрос отменён, повторно не планируем");
                return;
            }
            Err(e) => PollCompletion {
                reader: None,
                result: Err(IndicatorError::Internal(format!("фоновый опрос аварийно завершился: {}", e))),
            },
        };

        let outcome = match self.finish_poll(completion) {
            Ok(outcome) => outcome,
            Err(e) => return self.on_poll_failure(e),
        };

        debug_if_enabled!("Опрос завершён: {}", outcome);
        self.backoff = self.config.poll.retry_backoff();

        match outcome {
            PollOutcome::Label(label) => {
                if let Err(e) = self.push_label(&label) {
                    error!("Не удалось показать метку '{}': {}", label, e);
                }
                self.reschedule_after(self.config.poll.update_interval());
            }
            // подписчик умер; замена запустится на следующем опросе
            PollOutcome::NoUpdate(NoUpdateReason::StreamClosed) => {
                self.reschedule_after(self.config.poll.respawn_delay());
            }
            PollOutcome::NoUpdate(_) => self.reschedule_after(None),
        }
    }

    fn on_poll_failure(&mut self, e: IndicatorError) {
        match self.config.poll.failure_policy() {
            FailurePolicy::Stop => {
                error!("Опрос раскладки завершился ошибкой, подписка остановлена: {}", e);
                self.next_poll_at = None;
                self.set_state(IndicatorState::Stopped);
            }
            FailurePolicy::Retry => {
                let delay = self.backoff;
                warn!("Опрос раскладки завершился ошибкой: {}. Повтор через {:?}", e, delay);
                self.backoff = (self.backoff * 2).min(self.config.poll.max_backoff());
                self.reschedule_after(Some(delay));
            }
        }
    }

    /// Отменить незавершённый опрос и убить подписчика
    pub async fn on_teardown(&mut self) {
        info!("Teardown индикатора раскладки");

        if let Some(pending) = self.pending.take() {
            if !pending.handle.is_finished() {
                pending.handle.abort();
            }
        }
        self.next_poll_at = None;
        self.set_state(IndicatorState::Stopped);

        if !self.subscriber.was_spawned() {
            return;
        }
        self.subscriber.kill().await;
    }

    /// Основной цикл: инициализация, подписка, обработка завершений до teardown
    pub async fn run(mut self, mut hooks: mpsc::Receiver<LifecycleHook>) -> Result<()> {
        if let Err(e) = self.initialize().await {
            self.on_teardown().await;
            return Err(e);
        }

        self.reschedule_after(None);

        loop {
            let event = tokio::select! {
                hook = hooks.recv() => LoopEvent::Hook(hook),
                joined = wait_pending(&mut self.pending) => LoopEvent::PollDone(joined),
                _ = wait_deadline(self.next_poll_at) => LoopEvent::PollDue,
            };

            match event {
                LoopEvent::Hook(Some(LifecycleHook::Teardown)) => {
                    info!("Получен запрос teardown от хоста");
                    break;
                }
                LoopEvent::Hook(None) => {
                    info!("Все хендлы индикатора закрыты");
                    break;
                }
                LoopEvent::PollDone(joined) => {
                    self.pending = None;
                    self.on_poll_done(joined);
                }
                LoopEvent::PollDue => {
                    self.next_poll_at = None;
                    if let Err(e) = self.schedule_next_poll() {
                        self.on_poll_failure(e);
                    }
                }
            }
        }

        self.on_teardown().await;
        Ok(())
    }
}

enum LoopEvent {
    Hook(Option<LifecycleHook>),
    PollDone(std::result::Result<PollCompletion, JoinError>),
    PollDue,
}

async fn wait_pending(
    pending: &mut Option<PendingPoll>,
) -> std::result::Result<PollCompletion, JoinError> {
    match pending {
        Some(pending) => (&mut pending.handle).await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
