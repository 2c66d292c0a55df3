use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AppState;
use crate::usecase::IngestOutcome;

const SUCCESS_ENVELOPE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <InvokeSrvResponse xmlns="http://tempuri.org/">
      <InvokeSrvResult>Success</InvokeSrvResult>
    </InvokeSrvResponse>
  </soap:Body>
</soap:Envelope>"#;

const WSDL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<wsdl:definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/" xmlns:tns="http://tempuri.org/" targetNamespace="http://tempuri.org/" xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/">
  <wsdl:service name="EFERPService">
    <wsdl:port name="EFERPServiceSoap" binding="tns:EFERPServiceSoap">
      <soap:address location="http://localhost/EFNETService/EFERPService.asmx" />
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#;

/// ERP からの伝票受信。処理結果にかかわらず常に Success を返し、エラーはログにのみ記録する。
pub async fn invoke_service(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match state.ingest_document_uc.execute(&body).await {
        Ok(IngestOutcome::Started { instance_id }) => {
            tracing::debug!(instance_id = %instance_id, "soap request accepted");
        }
        Ok(IngestOutcome::Duplicate { instance_id }) => {
            tracing::debug!(instance_id = %instance_id, "soap request was a duplicate");
        }
        Ok(IngestOutcome::Discarded) => {}
        Err(e) => {
            tracing::error!(error = %e, "failed to ingest erp document");
        }
    }

    (
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        SUCCESS_ENVELOPE,
    )
}

pub async fn wsdl() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/xml")], WSDL)
}
