/*
 * Responsibility
 * - middleware の公開インターフェース
 * - http: 全ルート共通 (request-id / trace / body limit / timeout)
 * - security_headers: /elastauth/... の bypass ルートのみ
 */
pub mod http;
pub mod security_headers;
