use tracing::{debug, error};

use crate::error::{LoadError, LoadResult};
use crate::models::Table;

const DELIMITER: char = '\t';

pub struct TabularFetcher {
    client: reqwest::Client,
}

impl TabularFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn fetch_table(&self, url: &str) -> LoadResult<Table> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|source| {
                error!("Request to {} failed: {}", url, source);
                LoadError::Network {
                    url: url.to_string(),
                    source,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Request to {} returned {}", url, status);
            return Err(LoadError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| LoadError::Network {
            url: url.to_string(),
            source,
        })?;
        let table = parse_tsv(&body);
        debug!("{} -> {} data row(s)", url, table.rows.len());
        Ok(table)
    }
}

impl Default for TabularFetcher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_tsv(body: &str) -> Table {
    let normalized = body.replace('\r', "");
    let mut lines = normalized
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(DELIMITER).map(str::to_string).collect::<Vec<_>>());

    let header = lines.next().unwrap_or_default();
    Table {
        header,
        rows: lines.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn splits_header_and_rows() {
        let table = parse_tsv("EntryID\tBeer\r\nB-001\tHelles\r\nB-002\t\r\n\r\n\n");
        assert_eq!(table.header, vec!["EntryID", "Beer"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["B-001".to_string(), "Helles".to_string()],
                vec!["B-002".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn empty_body_is_empty_table() {
        let table = parse_tsv("");
        assert!(table.header.is_empty());
        assert!(table.rows.is_empty());
    }

    #[tokio::test]
    async fn fetches_and_parses_a_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/winners.tsv"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("Category\tEntryID\nFlavor\tB-001\n"),
            )
            .mount(&server)
            .await;

        let fetcher = TabularFetcher::new();
        let table = fetcher
            .fetch_table(&format!("{}/winners.tsv", server.uri()))
            .await
            .unwrap();
        assert_eq!(table.header, vec!["Category", "EntryID"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = TabularFetcher::new();
        let err = fetcher
            .fetch_table(&format!("{}/leaderboard.tsv", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Status { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let fetcher = TabularFetcher::new();
        let err = fetcher
            .fetch_table("http://127.0.0.1:9/registrants.tsv")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Network { .. }));
    }
}
