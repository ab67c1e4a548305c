// The in-process web client, served the same way the gateway serves
// JSON. Camera preview, shutter, facing toggle, prompt editor, pending
// pulse, review with share-or-download, retry.

use axum::response::Html;

pub async fn index() -> Html<&'static str> {
    Html(
        r##"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0, user-scalable=no">
    <title>Dreamlens</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }

        html, body {
            height: 100%;
            background: #222222;
            overflow: hidden;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        }

        #stage {
            position: relative;
            height: 100%;
        }

        #preview, #still {
            position: absolute;
            inset: 0;
            width: 100%;
            height: 100%;
            object-fit: cover;
        }

        #preview.mirrored { transform: scaleX(-1); }

        #still { display: none; }
        #still.pulsing { animation: pulse 1s ease-in-out infinite; }

        @keyframes pulse {
            0%   { opacity: 1.0; }
            50%  { opacity: 0.5; }
            100% { opacity: 1.0; }
        }

        #offline {
            position: absolute;
            inset: 0;
            display: none;
            align-items: center;
            justify-content: center;
            font-size: 10em;
            color: #ffffff80;
        }

        .bar {
            position: absolute;
            left: 0;
            right: 0;
            bottom: 32px;
            display: flex;
            align-items: center;
            justify-content: space-around;
        }

        .bar button {
            border: none;
            background: transparent;
            color: #ffffff80;
            font-size: 2em;
            padding: 20px;
            cursor: pointer;
        }

        .bar button.round {
            background: #200020d0;
            color: #ffffff;
            border-radius: 100px;
        }

        #shutter {
            font-size: 4em;
            color: #800080;
            background: #80008080;
            border-radius: 50%;
            width: 110px;
            height: 110px;
        }

        .hidden { display: none !important; }
    </style>
</head>
<body>
    <div id="stage">
        <video id="preview" autoplay playsinline muted></video>
        <img id="still" alt="">
        <div id="offline">&#128246;&#10060;</div>

        <div class="bar" id="cameraBar">
            <button id="promptBtn" title="Prompt">&#127912;</button>
            <button id="shutter" title="Dream">&#9678;</button>
            <button id="flipBtn" title="Flip camera">&#128260;</button>
        </div>

        <div class="bar hidden" id="reviewBar">
            <button id="shareBtn" class="round hidden" title="Share">&#8679;</button>
            <span></span>
            <button id="retryBtn" class="round" title="Back to camera">&#8635;</button>
        </div>
    </div>

    <script>
        const preview = document.getElementById('preview');
        const still = document.getElementById('still');
        const offline = document.getElementById('offline');
        const cameraBar = document.getElementById('cameraBar');
        const reviewBar = document.getElementById('reviewBar');
        const shareBtn = document.getElementById('shareBtn');

        let facing = 'environment';
        let phase = 'idle';   // idle | pending | review | error
        let picture = '';
        let stream = null;

        async function startCamera() {
            if (stream) {
                stream.getTracks().forEach(t => t.stop());
            }
            stream = await navigator.mediaDevices.getUserMedia({
                video: { facingMode: facing }
            });
            preview.srcObject = stream;
            preview.classList.toggle('mirrored', facing === 'user');
        }

        function show(p) {
            phase = p;
            preview.classList.toggle('hidden', p !== 'idle');
            cameraBar.classList.toggle('hidden', p !== 'idle');
            still.style.display = p === 'idle' ? 'none' : 'block';
            still.classList.toggle('pulsing', p === 'pending');
            offline.style.display = p === 'error' ? 'flex' : 'none';
            reviewBar.classList.toggle('hidden', p !== 'review' && p !== 'error');
            shareBtn.classList.toggle('hidden', p !== 'review');
        }

        function grabFrame() {
            const canvas = document.createElement('canvas');
            canvas.width = preview.videoWidth;
            canvas.height = preview.videoHeight;
            const ctx = canvas.getContext('2d');
            if (facing === 'user') {
                // Undo the mirrored preview: rotate 180 then flip vertically.
                ctx.translate(canvas.width / 2, canvas.height / 2);
                ctx.rotate(Math.PI);
                ctx.scale(1, -1);
                ctx.translate(-canvas.width / 2, -canvas.height / 2);
            }
            ctx.drawImage(preview, 0, 0);
            return canvas.toDataURL('image/png');
        }

        async function takePicture() {
            if (phase !== 'idle') return;
            picture = grabFrame();
            still.src = picture;
            show('pending');
            try {
                const generated = await generate(picture);
                if (generated) {
                    picture = generated;
                    still.src = picture;
                    show('review');
                } else {
                    show('error');
                }
            } catch (e) {
                console.log(e);
                show('error');
            }
        }

        async function generate(capture) {
            let url = 'generate?dream=' + (localStorage.getItem('dream') || '73');
            const custom = localStorage.getItem('custom');
            if (custom) {
                url += '&custom=' + encodeURIComponent(custom);
            }
            const response = await fetch(url, {
                method: 'POST',
                headers: { 'Content-Type': 'text/octet-stream' },
                body: capture
            });
            if (!response.ok) return null;
            const data = await response.json();
            if (!data.image) return null;
            return await toDataUri(data.image);
        }

        async function toDataUri(url) {
            const response = await fetch(url);
            if (!response.ok) throw new Error('Failed to fetch image');
            const blob = await response.blob();
            return await new Promise((resolve, reject) => {
                const reader = new FileReader();
                reader.onloadend = () => resolve(reader.result);
                reader.onerror = reject;
                reader.readAsDataURL(blob);
            });
        }

        function editPrompt() {
            let def = '';
            const dream = localStorage.getItem('dream');
            const custom = localStorage.getItem('custom');
            if (dream) def += dream + ':';
            if (custom) def += custom;
            const entry = prompt('Prompt?', def);
            if (entry === null) return;
            const parts = entry.split(':');
            if (parts.length >= 2 && /^\d+$/.test(parts[0]) && +parts[0] <= 100) {
                localStorage.setItem('dream', parts[0]);
                localStorage.setItem('custom', parts.slice(1).join(':'));
            } else if (entry !== '') {
                localStorage.removeItem('dream');
                localStorage.setItem('custom', entry);
            } else {
                localStorage.removeItem('dream');
                localStorage.removeItem('custom');
            }
        }

        function keepPicture() {
            if (navigator.share) {
                fetch(picture).then(x => x.blob()).then(blob => {
                    const file = new File([blob], 'MadeWithDreamlens.png', { type: blob.type });
                    navigator.share({ files: [file] });
                });
            } else {
                const link = document.createElement('a');
                link.download = 'MadeWithDreamlens.png';
                link.href = picture;
                document.body.appendChild(link);
                link.click();
                document.body.removeChild(link);
            }
        }

        function backToCamera() {
            if (phase !== 'review' && phase !== 'error') return;
            picture = '';
            show('idle');
        }

        document.getElementById('shutter').addEventListener('click', takePicture);
        document.getElementById('flipBtn').addEventListener('click', () => {
            facing = facing === 'environment' ? 'user' : 'environment';
            startCamera();
        });
        document.getElementById('promptBtn').addEventListener('click', editPrompt);
        shareBtn.addEventListener('click', keepPicture);
        document.getElementById('retryBtn').addEventListener('click', backToCamera);

        startCamera().catch(() => show('error'));
    </script>
</body>
</html>
        "##,
    )
}
