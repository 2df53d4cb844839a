//! Where the outcome of a successful request is written.

use axum::{
	http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
};
use bytes::Bytes;

/// An outbound response that the pipeline fills in. The owner decides when and
/// how it is actually transmitted.
pub trait ResponseSink: Send {
	fn set_status(&mut self, status: StatusCode);
	fn set_header(&mut self, name: HeaderName, value: HeaderValue);
	/// Sets the body and marks the response as complete.
	fn send(&mut self, body: Bytes);
}

/// A [`ResponseSink`] that buffers everything until it is turned into an axum
/// [`Response`].
#[derive(Debug, Default)]
pub struct PendingResponse {
	status: Option<StatusCode>,
	headers: HeaderMap,
	body: Option<Bytes>,
}

impl PendingResponse {
	pub fn status(&self) -> Option<StatusCode> {
		self.status
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	pub fn body(&self) -> Option<&Bytes> {
		self.body.as_ref()
	}

	pub fn is_sent(&self) -> bool {
		self.body.is_some()
	}
}

impl ResponseSink for PendingResponse {
	fn set_status(&mut self, status: StatusCode) {
		self.status = Some(status);
	}

	fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
		self.headers.insert(name, value);
	}

	fn send(&mut self, body: Bytes) {
		self.body = Some(body);
	}
}

impl IntoResponse for PendingResponse {
	fn into_response(self) -> Response {
		let status = self.status.unwrap_or(StatusCode::OK);
		(status, self.headers, self.body.unwrap_or_default()).into_response()
	}
}
