// src/inject/script.rs

/// Marker the reload script is inserted in front of.
pub const BODY_END_MARKER: &str = "</body>";

/// Client snippet injected into proxied HTML pages.
///
/// Listens on `/_dev` for `change` events. Updated stylesheets served by the
/// proxy are swapped in place; anything else reloads the page. The empty
/// batch sent after a restart always reloads.
pub const RELOAD_SCRIPT: &str = r#"
<script type="module" defer>
	const es = new EventSource("/_dev");
	es.addEventListener("change", (e) => {
		const data = JSON.parse(e.data);
		console.info("change event", data);

		for (const {File: file, Ext: ext, Events: events} of data.events) {
			const isCss = ext === ".css";
			const isUpdated = events.includes("Updated");

			if (isCss && isUpdated) {
				for (const link of document.getElementsByTagName("link")) {
					const url = new URL(link.href);

					if (url.host === location.host && url.pathname === file) {
						const next = link.cloneNode();
						next.href = file + "?" + Math.random().toString(36).slice(2);
						next.onload = () => link.remove();
						link.parentNode.insertBefore(next, link.nextSibling);
						console.info("replaced css", { old: link, new: next });
						return;
					}
				}
			}
		}

		console.info("reloading due to file change");
		window.location.reload();
	});
</script>"#;
