//! Stubbed sales peer.

use crate::call_log::{CallLog, Port, record};
use reporting_core::report::{DateRange, ReportFilter};
use reporting_core::sales::{PeerError, SalesDataSource};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Ok(serde_json::Value),
    Err(PeerError),
}

/// [`SalesDataSource`] with a canned reply.
#[derive(Clone, Debug)]
pub struct StubSalesSource {
    reply: Arc<Mutex<Reply>>,
    latency: Arc<Mutex<Option<Duration>>>,
    requests: Arc<Mutex<Vec<(Option<DateRange>, ReportFilter)>>>,
    log: Option<CallLog>,
}

impl StubSalesSource {
    /// Always answer with `data`.
    #[must_use]
    pub fn returning(data: serde_json::Value) -> Self {
        Self::with_reply(Reply::Ok(data))
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: PeerError) -> Self {
        Self::with_reply(Reply::Err(error))
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply: Arc::new(Mutex::new(reply)),
            latency: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            log: None,
        }
    }

    /// Record every call in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Arguments of every call so far.
    #[must_use]
    pub fn requests(&self) -> Vec<(Option<DateRange>, ReportFilter)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for StubSalesSource {
    fn default() -> Self {
        Self::returning(serde_json::json!({}))
    }
}

impl SalesDataSource for StubSalesSource {
    fn fetch_sales(
        &self,
        date_range: Option<&DateRange>,
        filter: &ReportFilter,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, PeerError>> + Send + '_>> {
        let request = (date_range.copied(), filter.clone());
        Box::pin(async move {
            record(self.log.as_ref(), Port::Sales, "fetch_sales", "");
            self.requests.lock().unwrap().push(request);
            let latency = *self.latency.lock().unwrap();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let reply = self.reply.lock().unwrap().clone();
            match reply {
                Reply::Ok(data) => Ok(data),
                Reply::Err(error) => Err(error),
            }
        })
    }
}
