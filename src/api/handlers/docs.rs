use axum::{
    http::header,
    response::{Html, IntoResponse},
};

const OPENAPI_YAML: &str = include_str!("../openapi.yaml");

const SWAGGER_UI: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>elastauth API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({ url: "/elastauth/api/openapi.yaml", dom_id: "#swagger-ui" });
  </script>
</body>
</html>
"##;

pub async fn docs() -> Html<&'static str> {
    Html(SWAGGER_UI)
}

pub async fn openapi() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/yaml")], OPENAPI_YAML)
}
