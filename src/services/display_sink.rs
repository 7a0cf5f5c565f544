use crate::config::Config;
use crate::error::Result;
use crate::indicator_error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Область отображения хоста: одна текстовая строка с текущей меткой
pub trait DisplaySink: Send {
    fn push_label(&mut self, text: &str) -> Result<()>;
}

/// Метка построчно в stdout (polybar/lemonbar/waybar custom module)
pub struct StdoutSink;

impl DisplaySink for StdoutSink {
    fn push_label(&mut self, text: &str) -> Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", text)?;
        handle.flush()?;
        Ok(())
    }
}

/// Метка в файл, который читает бар. Запись через временный файл + rename,
/// чтобы читатель не увидел пустой файл.
pub struct FileSink {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Self { path, tmp_path }
    }
}

impl DisplaySink for FileSink {
    fn push_label(&mut self, text: &str) -> Result<()> {
        fs::write(&self.tmp_path, format!("{}\n", text))?;
        fs::rename(&self.tmp_path, &self.path)?;
        debug!("Метка '{}' записана в {:?}", text, self.path);
        Ok(())
    }
}

pub fn create_display_sink(config: &Config) -> Result<Box<dyn DisplaySink>> {
    match config.display.mode.as_str() {
        "stdout" => {
            info!("Вывод метки раскладки в stdout");
            Ok(Box::new(StdoutSink))
        }
        "file" => {
            let path = config
                .display
                .path
                .clone()
                .ok_or_else(|| indicator_error!(config, "display.mode = \"file\" требует display.path"))?;
            info!("Вывод метки раскладки в файл {:?}", path);
            Ok(Box::new(FileSink::new(path)))
        }
        other => Err(indicator_error!(config, "Неверный режим вывода: {}", other)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout");
        let mut sink = FileSink::new(path.clone());

        sink.push_label("us").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "us\n");

        sink.push_label("RU").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "RU\n");
        assert!(!dir.path().join("layout.tmp").exists());
    }

    #[test]
    fn test_factory_respects_mode() {
        let mut config = Config::default();
        assert!(create_display_sink(&config).is_ok());

        config.display.mode = "file".to_string();
        assert!(create_display_sink(&config).is_err());

        config.display.path = Some(PathBuf::from("/tmp/xkb-layout"));
        assert!(create_display_sink(&config).is_ok());

        config.display.mode = "osd".to_string();
        assert!(create_display_sink(&config).is_err());
    }

    #[test]
    fn test_recording_sink_shares_history() {
        let recorder = testing::RecordingSink::default();
        let mut sink: Box<dyn DisplaySink> = Box::new(recorder.clone());
        sink.push_label("us").unwrap();
        sink.push_label("RU").unwrap();
        assert_eq!(recorder.labels(), vec!["us", "RU"]);
        assert_eq!(recorder.last().as_deref(), Some("RU"));
    }
}
