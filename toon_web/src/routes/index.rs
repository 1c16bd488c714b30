use axum::response::Html;

// The whole UI surface: pick a jpg/jpeg/png, post the raw bytes, show the
// predicted character with its confidence.
const UPLOAD_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Doraemon &amp; WALL-E classifier</title>
</head>
<body>
  <h1>Doraemon &amp; WALL-E classifier</h1>
  <p>Upload an image and the model predicts which character it depicts.</p>
  <input id="file" type="file" accept=".jpg,.jpeg,.png">
  <div id="preview"></div>
  <div id="result"></div>
  <progress id="confidence" max="1" value="0" hidden></progress>
  <script>
    const file = document.getElementById('file');
    const result = document.getElementById('result');
    const confidence = document.getElementById('confidence');
    const preview = document.getElementById('preview');

    file.addEventListener('change', async () => {
      const selected = file.files[0];
      if (!selected) return;

      preview.innerHTML = '';
      const img = document.createElement('img');
      img.src = URL.createObjectURL(selected);
      img.style.maxWidth = '320px';
      preview.appendChild(img);

      result.textContent = 'Classifying...';
      confidence.hidden = true;

      const response = await fetch('/predict', {
        method: 'POST',
        body: await selected.arrayBuffer(),
      });
      const body = await response.json();

      if (!response.ok) {
        result.textContent = body.error;
        return;
      }

      result.textContent = `Prediction: ${body.label} (probability ${body.confidence_display})`;
      confidence.value = body.confidence;
      confidence.hidden = false;
    });
  </script>
</body>
</html>
"#;

pub async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}
