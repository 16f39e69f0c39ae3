//! The HTML page that bootstraps the external editor client.

use filehub_core::SessionDescriptor;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="utf-8">
    <title>{{TITLE}}</title>
    <style>
        html, body { height: 100%; margin: 0; padding: 0; }
        #editor { height: 100%; }
    </style>
</head>
<body>
<div id="editor"></div>
<script type="text/javascript" src="{{DOC_SERVER}}/web-apps/apps/api/documents/api.js"></script>
<script type="text/javascript">
    new DocsAPI.DocEditor("editor", {
        document: {
            fileType: {{FILE_TYPE}},
            key: {{DOC_KEY}},
            title: {{FILE_NAME}},
            url: {{DOWNLOAD_URL}},
            permissions: { modifyFilter: false }
        },
        documentType: {{DOC_TYPE}},
        editorConfig: {
            lang: {{LANG}},
            mode: "edit",
            callbackUrl: {{CALLBACK_URL}},
            user: { id: {{USER_ID}}, name: {{USER_NAME}} }
        },
        token: {{TOKEN}}
    });
</script>
</body>
</html>
"#;

/// Render the editor page for one session.
///
/// Values landing inside the inline script are JSON-encoded so a filename
/// containing quotes cannot break out of the script block.
pub fn render(
    descriptor: &SessionDescriptor,
    doc_server_url: &str,
    username: &str,
    user_id: &str,
) -> String {
    TEMPLATE
        .replace("{{TITLE}}", &escape_html(&descriptor.file_name))
        .replace("{{DOC_SERVER}}", doc_server_url.trim_end_matches('/'))
        .replace("{{FILE_TYPE}}", &js_string(&descriptor.file_type))
        .replace("{{DOC_KEY}}", &js_string(&descriptor.document_key))
        .replace("{{FILE_NAME}}", &js_string(&descriptor.file_name))
        .replace("{{DOWNLOAD_URL}}", &js_string(&descriptor.document_url))
        .replace("{{DOC_TYPE}}", &js_string(descriptor.doc_type))
        .replace("{{CALLBACK_URL}}", &js_string(&descriptor.callback_url))
        .replace("{{LANG}}", &js_string(&descriptor.lang))
        .replace("{{USER_ID}}", &js_string(user_id))
        .replace("{{USER_NAME}}", &js_string(username))
        .replace("{{TOKEN}}", &js_string(&descriptor.token))
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_owned())
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
