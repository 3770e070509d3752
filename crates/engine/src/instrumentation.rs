/// Pre-navigation init script (spec.md §4.H "Instrumentation"). Installed before any
/// page script runs so every patch observes the page's real first touch of these APIs.
/// All patches delegate to the original implementation so observed return values never
/// change; they only record a flag or event on `window.__paState`.
pub const INIT_SCRIPT: &str = r#"
(function () {
    if (window.__paState) return;
    const state = {
        canvas: false,
        webgl: false,
        font: false,
        keylogger: false,
        formSnooping: false,
        serviceWorker: false,
        beaconCalls: [],
        requests: [],
        inlineScripts: [],
    };
    window.__paState = state;

    function record(list, entry, cap) {
        list.push(entry);
        if (cap && list.length > cap) list.shift();
    }

    const proto = HTMLCanvasElement.prototype;
    const origToDataURL = proto.toDataURL;
    proto.toDataURL = function () {
        state.canvas = true;
        return origToDataURL.apply(this, arguments);
    };
    const ctxProto = CanvasRenderingContext2D.prototype;
    const origGetImageData = ctxProto.getImageData;
    ctxProto.getImageData = function () {
        state.canvas = true;
        return origGetImageData.apply(this, arguments);
    };

    const origGetContext = HTMLCanvasElement.prototype.getContext;
    HTMLCanvasElement.prototype.getContext = function (type) {
        if (type === 'webgl' || type === 'webgl2' || type === 'experimental-webgl') {
            state.webgl = true;
        }
        return origGetContext.apply(this, arguments);
    };

    if (document.fonts && document.fonts.check) {
        const origCheck = document.fonts.check.bind(document.fonts);
        document.fonts.check = function () {
            state.font = true;
            return origCheck.apply(document.fonts, arguments);
        };
    }

    for (const target of [document, window]) {
        for (const evt of ['keydown', 'keypress', 'keyup']) {
            target.addEventListener(evt, function () { state.keylogger = true; }, true);
        }
    }

    try {
        const desc = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value');
        Object.defineProperty(HTMLInputElement.prototype, 'value', {
            get: function () {
                state.formSnooping = true;
                return desc.get.call(this);
            },
            set: function (v) {
                return desc.set.call(this, v);
            },
            configurable: true,
        });
    } catch (e) {}

    if (navigator.sendBeacon) {
        const origBeacon = navigator.sendBeacon.bind(navigator);
        navigator.sendBeacon = function (url, data) {
            record(state.beaconCalls, { url: String(url), hasData: !!data }, 50);
            return origBeacon(url, data);
        };
    }

    if (navigator.serviceWorker && navigator.serviceWorker.register) {
        const origRegister = navigator.serviceWorker.register.bind(navigator.serviceWorker);
        navigator.serviceWorker.register = function () {
            state.serviceWorker = true;
            return origRegister.apply(navigator.serviceWorker, arguments);
        };
    }

    const origFetch = window.fetch ? window.fetch.bind(window) : null;
    if (origFetch) {
        window.fetch = function (input, init) {
            const url = typeof input === 'string' ? input : (input && input.url) || '';
            record(state.requests, { url: url, method: (init && init.method) || 'GET', type: 'fetch', hasPostData: !!(init && init.body) }, 500);
            return origFetch(input, init);
        };
    }

    const origOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (method, url) {
        record(state.requests, { url: String(url), method: String(method), type: 'xhr', hasPostData: false }, 500);
        return origOpen.apply(this, arguments);
    };
})();
"#;
