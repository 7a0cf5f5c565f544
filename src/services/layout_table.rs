use crate::error::{IndicatorError, Result};
use std::collections::HashMap;

/// Упорядоченный список раскладок: индекс в списке = индекс xkblayout-state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: Vec<String>,
}

impl LayoutTable {
    pub fn new(layouts: Vec<String>) -> Self {
        Self { layouts }
    }

    /// Разбирает вывод `print %S`. Пустой вывод даёт пустую таблицу,
    /// пустые строки внутри сохраняются, чтобы индексы не сдвигались.
    pub fn parse(output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        let layouts = trimmed
            .split('\n')
            .map(|line| line.trim().to_string())
            .collect();

        Self { layouts }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.layouts.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

/// Преобразует сырое состояние (индекс раскладки) в метку для отображения
#[derive(Debug, Clone, Default)]
pub struct LayoutLabeler {
    table: LayoutTable,
    display_map: HashMap<String, String>,
}

impl LayoutLabeler {
    pub fn new(table: LayoutTable, display_map: HashMap<String, String>) -> Self {
        Self { table, display_map }
    }

    #[allow(dead_code)]
    pub fn table(&self) -> &LayoutTable {
        &self.table
    }

    pub fn replace_table(&mut self, table: LayoutTable) {
        self.table = table;
    }

    /// Метка для индекса. Индекс вне таблицы отображается как есть.
    pub fn display_label(&self, index: i64) -> String {
        let raw = usize::try_from(index)
            .ok()
            .and_then(|i| self.table.get(i))
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string());

        self.display_map.get(&raw).cloned().unwrap_or(raw)
    }

    /// Разбирает строку состояния и возвращает метку
    pub fn label_for_state(&self, state: &str) -> Result<String> {
        let index = parse_state(state)?;
        Ok(self.display_label(index))
    }
}

/// Разбор строки с индексом раскладки
pub fn parse_state(state: &str) -> Result<i64> {
    let state = state.trim();
    match state.parse::<i64>() {
        Ok(index) => Ok(index),
        Err(e) => IndicatorError::parse(state, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeler() -> LayoutLabeler {
        let table = LayoutTable::parse("us\nru\nlt sgs\n");
        let display_map = HashMap::from([
            ("ru".to_string(), "RU".to_string()),
            ("lt sgs".to_string(), "sgs".to_string()),
        ]);
        LayoutLabeler::new(table, display_map)
    }

    #[test]
    fn test_parse_layout_table() {
        let table = LayoutTable::parse("us\nru\nlt sgs\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("us"));
        assert_eq!(table.get(2), Some("lt sgs"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_empty_output_gives_empty_table() {
        assert!(LayoutTable::parse("").is_empty());
        assert!(LayoutTable::parse("\n  \n").is_empty());
    }

    #[test]
    fn test_interior_blank_line_keeps_indices() {
        let table = LayoutTable::parse("us\n\nde");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(""));
        assert_eq!(table.get(2), Some("de"));
    }

    #[test]
    fn test_label_matches_display_map_or_raw_name() {
        let labeler = labeler();
        for i in 0..labeler.table().len() {
            let raw = labeler.table().get(i).unwrap().to_string();
            let expected = labeler.display_map.get(&raw).cloned().unwrap_or(raw);
            assert_eq!(labeler.display_label(i as i64), expected);
        }
        assert_eq!(labeler.display_label(0), "us");
        assert_eq!(labeler.display_label(1), "RU");
    }

    #[test]
    fn test_out_of_range_falls_back_to_raw_index() {
        let labeler = labeler();
        assert_eq!(labeler.display_label(7), "7");
        assert_eq!(labeler.display_label(-1), "-1");

        let empty = LayoutLabeler::default();
        assert_eq!(empty.display_label(0), "0");
    }

    #[test]
    fn test_label_for_state_parses_and_trims() {
        let labeler = labeler();
        assert_eq!(labeler.label_for_state(" 1\n").unwrap(), "RU");
        assert!(matches!(
            labeler.label_for_state("ru"),
            Err(IndicatorError::Parse { .. })
        ));
    }

    #[test]
    fn test_replace_table() {
        let mut labeler = labeler();
        labeler.replace_table(LayoutTable::new(vec!["de".to_string()]));
        assert_eq!(labeler.display_label(0), "de");
        assert_eq!(labeler.display_label(1), "1");
    }
}
