use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 搜尋來源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchSource {
    DLsite,
    Fanza,
    Vndb,
}

impl SearchSource {
    /// 固定的顯示順序
    pub const ALL: [SearchSource; 3] = [SearchSource::DLsite, SearchSource::Fanza, SearchSource::Vndb];

    /// 顯示名稱
    pub fn name(&self) -> &'static str {
        match self {
            SearchSource::DLsite => "DLsite",
            SearchSource::Fanza => "FANZA",
            SearchSource::Vndb => "VNDB",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 單筆搜尋結果，建立後不再變動
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 來源
    pub source: SearchSource,
    /// 來源網站的原生 ID（RJ123456、d_123456、v17 ...）
    pub id: String,
    /// 標題
    pub title: String,
    /// 詳細頁 URL
    pub url: String,
    /// 縮圖 URL，可能為空（之後再解析）
    pub thumb_url: String,
    /// 是否透過 VNDB 嗅探取得
    pub from_sniffing: bool,
}

impl SearchResult {
    pub fn new(source: SearchSource, id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
            title: title.into(),
            url: url.into(),
            thumb_url: String::new(),
            from_sniffing: false,
        }
    }

    pub fn with_thumb(mut self, thumb_url: impl Into<String>) -> Self {
        self.thumb_url = thumb_url.into();
        self
    }

    pub fn sniffed(mut self) -> Self {
        self.from_sniffing = true;
        self
    }
}

/// 單一 provider 呼叫的結果：成功清單或分類過的錯誤訊息
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub source: SearchSource,
    pub outcome: Result<Vec<SearchResult>, String>,
}

impl SearchResponse {
    pub fn ok(source: SearchSource, results: Vec<SearchResult>) -> Self {
        Self {
            source,
            outcome: Ok(results),
        }
    }

    pub fn error(source: SearchSource, message: impl Into<String>) -> Self {
        Self {
            source,
            outcome: Err(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }
}

/// 依來源分組的搜尋結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedResults {
    pub dlsite: Vec<SearchResult>,
    pub fanza: Vec<SearchResult>,
    pub vndb: Vec<SearchResult>,
    /// "<來源>: <訊息>"
    pub errors: Vec<String>,
}

impl GroupedResults {
    pub fn get(&self, source: SearchSource) -> &[SearchResult] {
        match source {
            SearchSource::DLsite => &self.dlsite,
            SearchSource::Fanza => &self.fanza,
            SearchSource::Vndb => &self.vndb,
        }
    }

    fn get_mut(&mut self, source: SearchSource) -> &mut Vec<SearchResult> {
        match source {
            SearchSource::DLsite => &mut self.dlsite,
            SearchSource::Fanza => &mut self.fanza,
            SearchSource::Vndb => &mut self.vndb,
        }
    }

    /// 依來源（而非完成順序）放入 provider 的回應
    pub fn absorb(&mut self, response: SearchResponse) {
        match response.outcome {
            Ok(results) => *self.get_mut(response.source) = results,
            Err(message) => self.errors.push(format!("{}: {}", response.source, message)),
        }
    }

    /// 附加一筆結果；同來源已有相同 ID 時忽略並回傳 false
    pub fn push_unique(&mut self, result: SearchResult) -> bool {
        let list = self.get_mut(result.source);
        if list.iter().any(|r| r.id == result.id) {
            return false;
        }
        list.push(result);
        true
    }

    pub fn contains(&self, source: SearchSource, id: &str) -> bool {
        self.get(source).iter().any(|r| r.id == id)
    }

    pub fn all(&self) -> Vec<&SearchResult> {
        self.dlsite.iter().chain(&self.fanza).chain(&self.vndb).collect()
    }

    pub fn total_count(&self) -> usize {
        self.dlsite.len() + self.fanza.len() + self.vndb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// 透過嗅探補上的結果數
    pub fn sniffed_count(&self) -> usize {
        self.all().iter().filter(|r| r.from_sniffing).count()
    }

    /// 每個非空分組的 (標籤, 起始索引, 長度)，順序與 `all()` 一致
    pub fn group_labels(&self) -> Vec<(&'static str, usize, usize)> {
        let mut labels = Vec::new();
        let mut idx = 0;

        for source in SearchSource::ALL {
            let len = self.get(source).len();
            if len > 0 {
                labels.push((source.name(), idx, len));
                idx += len;
            }
        }

        labels
    }
}

/// 從 VNDB 詳細頁嗅探到的候選 ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffResult {
    pub dlsite_ids: Vec<String>,
    pub fanza_ids: Vec<String>,
}

impl SniffResult {
    pub fn is_empty(&self) -> bool {
        self.dlsite_ids.is_empty() && self.fanza_ids.is_empty()
    }

    /// 加入候選 ID，保留第一次出現的順序
    pub fn add(&mut self, source: SearchSource, id: String) {
        let ids = match source {
            SearchSource::DLsite => &mut self.dlsite_ids,
            SearchSource::Fanza => &mut self.fanza_ids,
            SearchSource::Vndb => return,
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// 合併另一份嗅探結果
    pub fn merge(&mut self, other: SniffResult) {
        for id in other.dlsite_ids {
            self.add(SearchSource::DLsite, id);
        }
        for id in other.fanza_ids {
            self.add(SearchSource::Fanza, id);
        }
    }

    /// 排除已在原生結果中的 ID
    pub fn exclude_present(mut self, grouped: &GroupedResults) -> Self {
        let dlsite: HashSet<&str> = grouped.dlsite.iter().map(|r| r.id.as_str()).collect();
        let fanza: HashSet<&str> = grouped.fanza.iter().map(|r| r.id.as_str()).collect();
        self.dlsite_ids.retain(|id| !dlsite.contains(id.as_str()));
        self.fanza_ids.retain(|id| !fanza.contains(id.as_str()));
        self
    }

    /// 攤平成 (來源, ID) 任務清單
    pub fn tasks(&self) -> Vec<(SearchSource, String)> {
        self.dlsite_ids
            .iter()
            .map(|id| (SearchSource::DLsite, id.clone()))
            .chain(self.fanza_ids.iter().map(|id| (SearchSource::Fanza, id.clone())))
            .collect()
    }
}

/// 搜尋結果摘要文字
pub fn format_found(count: usize, sniff_count: usize) -> String {
    if sniff_count > 0 {
        format!("found {} results ({} via VNDB sniffing)", count, sniff_count)
    } else {
        format!("found {} results", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: SearchSource, id: &str) -> SearchResult {
        SearchResult::new(source, id, id, format!("https://example.com/{}", id))
    }

    #[test]
    fn test_absorb_routes_by_source() {
        let mut grouped = GroupedResults::default();
        grouped.absorb(SearchResponse::ok(SearchSource::Vndb, vec![result(SearchSource::Vndb, "v1")]));
        grouped.absorb(SearchResponse::error(SearchSource::Fanza, "timeout"));
        grouped.absorb(SearchResponse::ok(SearchSource::DLsite, vec![result(SearchSource::DLsite, "RJ1")]));

        assert_eq!(grouped.vndb.len(), 1);
        assert_eq!(grouped.dlsite.len(), 1);
        assert!(grouped.fanza.is_empty());
        assert_eq!(grouped.errors, vec!["FANZA: timeout".to_string()]);
        assert_eq!(grouped.total_count(), 2);
    }

    #[test]
    fn test_push_unique_rejects_duplicate_id() {
        let mut grouped = GroupedResults::default();
        assert!(grouped.push_unique(result(SearchSource::DLsite, "RJ1")));
        assert!(!grouped.push_unique(result(SearchSource::DLsite, "RJ1").sniffed()));
        assert!(grouped.push_unique(result(SearchSource::Fanza, "RJ1")));
        assert_eq!(grouped.dlsite.len(), 1);
        assert_eq!(grouped.sniffed_count(), 0);
    }

    #[test]
    fn test_group_labels_skip_empty() {
        let mut grouped = GroupedResults::default();
        grouped.dlsite = vec![result(SearchSource::DLsite, "RJ1"), result(SearchSource::DLsite, "RJ2")];
        grouped.vndb = vec![result(SearchSource::Vndb, "v1")];

        assert_eq!(grouped.group_labels(), vec![("DLsite", 0, 2), ("VNDB", 2, 1)]);
    }

    #[test]
    fn test_sniff_result_exclude_present() {
        let mut sniff = SniffResult::default();
        sniff.add(SearchSource::DLsite, "RJ1".to_string());
        sniff.add(SearchSource::DLsite, "RJ2".to_string());
        sniff.add(SearchSource::DLsite, "RJ1".to_string());
        sniff.add(SearchSource::Fanza, "abc_001".to_string());

        let mut grouped = GroupedResults::default();
        grouped.dlsite = vec![result(SearchSource::DLsite, "RJ1")];

        let sniff = sniff.exclude_present(&grouped);
        assert_eq!(sniff.dlsite_ids, vec!["RJ2".to_string()]);
        assert_eq!(sniff.fanza_ids, vec!["abc_001".to_string()]);
        assert_eq!(sniff.tasks().len(), 2);
    }

    #[test]
    fn test_format_found() {
        assert_eq!(format_found(3, 0), "found 3 results");
        assert_eq!(format_found(4, 1), "found 4 results (1 via VNDB sniffing)");
    }
}
