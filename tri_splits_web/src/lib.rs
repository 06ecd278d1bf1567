use leptos::*;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("GIT_COMMIT_HASH");

#[cfg(feature = "chart_plotly")]
use wasm_bindgen::{JsCast, JsValue};

#[cfg(feature = "chart_plotly")]
use wasm_bindgen_futures::JsFuture;

#[cfg(feature = "chart_plotly")]
use serde_wasm_bindgen::to_value as to_js;

#[cfg(feature = "chart_plotly")]
use web_sys::{Blob, FileList, HtmlInputElement, HtmlSelectElement};

#[cfg(feature = "chart_plotly")]
use tri_splits::{
    divisions_view, format_hms, parse_hms, scatter_view, splits_view, zoom_to, Axis, Dataset,
    DivisionsView, Metric, ScatterState, ScatterView, SplitsState, SplitsView, ZoomWindow,
};

#[cfg(feature = "chart_plotly")]
async fn read_csv_from_input(input: &HtmlInputElement) -> Option<(String, Vec<u8>)> {
    let files = input.files()?;
    let file = files.item(0)?;
    let name = file.name();
    match JsFuture::from(file.array_buffer()).await {
        Ok(buf) => {
            let u8arr = js_sys::Uint8Array::new(&buf);
            let mut bytes = vec![0u8; u8arr.length() as usize];
            u8arr.copy_to(&mut bytes[..]);
            Some((name, bytes))
        }
        Err(_) => None,
    }
}

#[cfg(feature = "chart_plotly")]
async fn read_csv_from_list(list: &FileList) -> Option<(String, Vec<u8>)> {
    let file = list.item(0)?;
    let name = file.name();
    match JsFuture::from(file.array_buffer()).await {
        Ok(buf) => {
            let u8arr = js_sys::Uint8Array::new(&buf);
            let mut bytes = vec![0u8; u8arr.length() as usize];
            u8arr.copy_to(&mut bytes[..]);
            Some((name, bytes))
        }
        Err(_) => None,
    }
}

#[cfg(feature = "chart_plotly")]
fn plot_xy(div_id: &str, traces: &js_sys::Array, layout: &JsValue) {
    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(div) = document.get_element_by_id(div_id) {
                let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
                    .unwrap_or(JsValue::UNDEFINED);
                if let Ok(func) = js_sys::Reflect::get(&plotly, &JsValue::from_str("react"))
                    .or_else(|_| js_sys::Reflect::get(&plotly, &JsValue::from_str("newPlot")))
                    .and_then(|v| v.dyn_into::<js_sys::Function>())
                {
                    let div_val = JsValue::from(div);
                    let traces_val = JsValue::from(traces.clone());
                    let _ = func.call3(&JsValue::NULL, &div_val, &traces_val, layout);
                }
            }
        }
    }
}

#[cfg(feature = "chart_plotly")]
fn f64_array(values: &[f64]) -> js_sys::Array {
    let arr = js_sys::Array::new();
    for v in values {
        arr.push(&JsValue::from_f64(*v));
    }
    arr
}

#[cfg(feature = "chart_plotly")]
fn str_array(values: &[String]) -> js_sys::Array {
    let arr = js_sys::Array::new();
    for v in values {
        arr.push(&JsValue::from_str(v));
    }
    arr
}

#[cfg(feature = "chart_plotly")]
fn set_prop(obj: &js_sys::Object, key: &str, value: &JsValue) {
    js_sys::Reflect::set(obj, &JsValue::from_str(key), value).ok();
}

#[cfg(feature = "chart_plotly")]
fn build_bar_trace(name: &str, x: &[String], y: &[f64], text: &[String], color: &str) -> JsValue {
    let trace = js_sys::Object::new();
    set_prop(&trace, "type", &JsValue::from_str("bar"));
    set_prop(&trace, "name", &JsValue::from_str(name));
    set_prop(&trace, "x", &str_array(x).into());
    set_prop(&trace, "y", &f64_array(y).into());
    set_prop(&trace, "text", &str_array(text).into());
    set_prop(
        &trace,
        "hovertemplate",
        &JsValue::from_str("%{x}: %{text}<extra></extra>"),
    );
    if let Ok(marker) = to_js(&serde_json::json!({ "color": color })) {
        set_prop(&trace, "marker", &marker);
    }
    trace.into()
}

#[cfg(feature = "chart_plotly")]
fn build_point_trace(name: &str, x: &[f64], y: &[f64], labels: &[String]) -> JsValue {
    let trace = js_sys::Object::new();
    set_prop(&trace, "type", &JsValue::from_str("scatter"));
    set_prop(&trace, "mode", &JsValue::from_str("markers"));
    set_prop(&trace, "name", &JsValue::from_str(name));
    set_prop(&trace, "x", &f64_array(x).into());
    set_prop(&trace, "y", &f64_array(y).into());
    set_prop(&trace, "text", &str_array(labels).into());
    set_prop(
        &trace,
        "hovertemplate",
        &JsValue::from_str("%{text}<br>%{x:.0f} s / %{y:.0f} s<extra></extra>"),
    );
    if let Ok(marker) = to_js(&serde_json::json!({ "size": 7, "color": "#1f77b4", "opacity": 0.7 }))
    {
        set_prop(&trace, "marker", &marker);
    }
    trace.into()
}

#[cfg(feature = "chart_plotly")]
fn build_line_trace(name: &str, x: &[f64], y: &[f64], color: &str) -> JsValue {
    let trace = js_sys::Object::new();
    set_prop(&trace, "type", &JsValue::from_str("scatter"));
    set_prop(&trace, "mode", &JsValue::from_str("lines"));
    set_prop(&trace, "name", &JsValue::from_str(name));
    set_prop(&trace, "x", &f64_array(x).into());
    set_prop(&trace, "y", &f64_array(y).into());
    set_prop(&trace, "hoverinfo", &JsValue::from_str("skip"));
    if let Ok(line) = to_js(&serde_json::json!({ "width": 2, "color": color })) {
        set_prop(&trace, "line", &line);
    }
    trace.into()
}

/// Tick positions and H:MM:SS labels for a seconds axis.
#[cfg(feature = "chart_plotly")]
fn time_ticks(lo: f64, hi: f64) -> (Vec<f64>, Vec<String>) {
    let span = (hi - lo).max(1.0);
    // Pick a step from a ladder of friendly time intervals.
    let steps = [
        60.0, 300.0, 600.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
    ];
    let step = steps
        .iter()
        .copied()
        .find(|s| span / s <= 8.0)
        .unwrap_or(14400.0);
    let mut vals = Vec::new();
    let mut labels = Vec::new();
    let mut tick = (lo / step).ceil() * step;
    while tick <= hi {
        vals.push(tick);
        labels.push(format_hms(tick));
        tick += step;
    }
    (vals, labels)
}

#[cfg(feature = "chart_plotly")]
fn time_axis(title: &str, lo: f64, hi: f64) -> serde_json::Value {
    let (vals, labels) = time_ticks(lo, hi);
    serde_json::json!({
        "title": title,
        "range": [lo, hi],
        "tickmode": "array",
        "tickvals": vals,
        "ticktext": labels,
    })
}

#[cfg(feature = "chart_plotly")]
fn render_splits_chart(view: &SplitsView) {
    let data = js_sys::Array::new();
    let palette = ["#1f77b4", "#ff7f0e"];
    let categories: Vec<String> = view.categories.iter().map(|c| c.to_string()).collect();
    for (idx, athlete) in view.series.iter().enumerate() {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut texts = Vec::new();
        for split in &athlete.splits {
            xs.push(split.metric.to_string());
            ys.push(split.secs);
            texts.push(split.label.clone());
        }
        let trace = build_bar_trace(
            &athlete.name,
            &xs,
            &ys,
            &texts,
            palette[idx % palette.len()],
        );
        data.push(&trace);
    }

    let layout = serde_json::json!({
        "title": view.title,
        "barmode": "group",
        "xaxis": { "categoryorder": "array", "categoryarray": categories },
        "yaxis": time_axis("Time", 0.0, view.y_max),
        "legend": { "orientation": "h" }
    });
    if let Ok(layout_js) = to_js(&layout) {
        plot_xy("splits_plot", &data, &layout_js);
    }
}

#[cfg(feature = "chart_plotly")]
fn render_scatter_chart(view: &ScatterView) {
    let data = js_sys::Array::new();
    let xs: Vec<f64> = view.points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = view.points.iter().map(|p| p.y).collect();
    let labels: Vec<String> = view.points.iter().map(|p| p.name.clone()).collect();
    let points = build_point_trace("Athletes", &xs, &ys, &labels);
    data.push(&points);

    if let (Some(fit), Some((start, end))) = (view.trend, view.trend_endpoints()) {
        let trace = build_line_trace(
            &format!("trend (r = {:.2})", fit.correlation),
            &[start.0, end.0],
            &[start.1, end.1],
            "#d62728",
        );
        data.push(&trace);
    }

    let layout = serde_json::json!({
        "title": view.title,
        "hovermode": "closest",
        "dragmode": "select",
        "xaxis": time_axis(&view.x_label, view.x_domain.0, view.x_domain.1),
        "yaxis": time_axis(&view.y_label, view.y_domain.0, view.y_domain.1),
        "legend": { "orientation": "h" }
    });
    if let Ok(layout_js) = to_js(&layout) {
        plot_xy("scatter_plot", &data, &layout_js);
    }
}

#[cfg(feature = "chart_plotly")]
fn render_divisions_chart(view: &DivisionsView) {
    let data = js_sys::Array::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut texts = Vec::new();
    let mut colors = Vec::new();
    for bar in &view.bars {
        xs.push(bar.label());
        ys.push(bar.mean_overall_secs);
        texts.push(bar.formatted_mean());
        colors.push(match bar.gender.letter() {
            'F' => "#d62728".to_string(),
            _ => "#1f77b4".to_string(),
        });
    }
    let trace = js_sys::Object::new();
    set_prop(&trace, "type", &JsValue::from_str("bar"));
    set_prop(&trace, "x", &str_array(&xs).into());
    set_prop(&trace, "y", &f64_array(&ys).into());
    set_prop(&trace, "text", &str_array(&texts).into());
    set_prop(
        &trace,
        "hovertemplate",
        &JsValue::from_str("%{x}: %{text}<extra></extra>"),
    );
    if let Ok(marker) = to_js(&serde_json::json!({ "color": colors })) {
        set_prop(&trace, "marker", &marker);
    }
    set_prop(&trace, "showlegend", &JsValue::from_bool(false));
    data.push(&JsValue::from(trace));

    let layout = serde_json::json!({
        "title": view.title,
        "xaxis": { "tickangle": -45 },
        "yaxis": time_axis("Mean Overall", 0.0, view.y_max),
    });
    if let Ok(layout_js) = to_js(&layout) {
        plot_xy("divisions_plot", &data, &layout_js);
    }
}

#[cfg(feature = "chart_plotly")]
fn blob_url_from_str(s: &str) -> String {
    let arr = js_sys::Array::new();
    arr.push(&JsValue::from_str(s));
    match Blob::new_with_str_sequence(&arr) {
        Ok(blob) => web_sys::Url::create_object_url_with_blob(&blob).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

#[cfg(feature = "chart_plotly")]
fn averages_csv(view: &DivisionsView) -> String {
    let mut out = String::from("division,gender,mean_overall,mean_overall_s\n");
    for bar in &view.bars {
        out.push_str(&format!(
            "{},{},{},{:.1}\n",
            bar.division,
            bar.gender.label(),
            bar.formatted_mean(),
            bar.mean_overall_secs
        ));
    }
    out
}

#[cfg(feature = "chart_plotly")]
fn metric_from_value(value: &str) -> Metric {
    match value {
        "Swim" => Metric::Swim,
        "Run" => Metric::Run,
        _ => Metric::Bike,
    }
}

#[component]
pub fn App() -> impl IntoView {
    let (dataset, set_dataset) = create_signal(Option::<Dataset>::None);
    let (status, set_status) = create_signal(String::from("No results loaded."));
    let (athletes, set_athletes) = create_signal(Vec::<String>::new());
    let (splits_state, set_splits_state) = create_signal(Option::<SplitsState>::None);
    let (scatter_state, set_scatter_state) = create_signal(ScatterState::default());
    let (zoom_text, set_zoom_text) = create_signal(String::new());
    let (csv_href, set_csv_href) = create_signal(String::new());

    let load_bytes = move |name: String, bytes: Vec<u8>| {
        match Dataset::from_bytes(&bytes) {
            Ok(data) => {
                set_status.set(format!(
                    "Loaded {}: {} athletes.",
                    name,
                    data.athlete_names().len()
                ));
                set_athletes.set(data.athlete_names());
                set_splits_state.set(Some(SplitsState::default_for(&data)));
                set_scatter_state.set(ScatterState::default());

                let old = csv_href.get_untracked();
                if !old.is_empty() {
                    let _ = web_sys::Url::revoke_object_url(&old);
                }
                set_csv_href.set(blob_url_from_str(&averages_csv(&divisions_view(&data))));
                set_dataset.set(Some(data));
            }
            Err(err) => {
                set_status.set(format!("Failed to load {}: {}", name, err));
            }
        }
    };

    let on_file = move |ev: leptos::ev::Event| {
        if let Some(target) = ev.target() {
            if let Ok(input) = target.dyn_into::<HtmlInputElement>() {
                let input_clone = input.clone();
                set_status.set("Reading file…".to_string());
                spawn_local(async move {
                    if let Some((name, bytes)) = read_csv_from_input(&input_clone).await {
                        input_clone.set_value("");
                        load_bytes(name, bytes);
                    }
                });
            }
        }
    };

    // Splits chart re-renders on any athlete selection change.
    create_effect(move |_| {
        if let (Some(data), Some(state)) = (dataset.get(), splits_state.get()) {
            match splits_view(&data, &state) {
                Ok(view) => render_splits_chart(&view),
                Err(err) => set_status.set(format!("{}", err)),
            }
        }
    });

    // Scatter chart re-renders on metric, trend or zoom changes.
    create_effect(move |_| {
        if let Some(data) = dataset.get() {
            let view = scatter_view(&data, &scatter_state.get());
            render_scatter_chart(&view);
        }
    });

    // Divisions chart only depends on the dataset.
    create_effect(move |_| {
        if let Some(data) = dataset.get() {
            render_divisions_chart(&divisions_view(&data));
        }
    });

    let on_athlete_a = move |ev: leptos::ev::Event| {
        if let Some(t) = ev.target() {
            if let Ok(sel) = t.dyn_into::<HtmlSelectElement>() {
                set_splits_state.update(|state| {
                    if let Some(s) = state.as_mut() {
                        s.athlete_a = sel.value();
                    }
                });
            }
        }
    };

    let on_athlete_b = move |ev: leptos::ev::Event| {
        if let Some(t) = ev.target() {
            if let Ok(sel) = t.dyn_into::<HtmlSelectElement>() {
                let value = sel.value();
                set_splits_state.update(|state| {
                    if let Some(s) = state.as_mut() {
                        s.athlete_b = if value.is_empty() { None } else { Some(value) };
                    }
                });
            }
        }
    };

    let on_x_metric = move |ev: leptos::ev::Event| {
        if let Some(t) = ev.target() {
            if let Ok(sel) = t.dyn_into::<HtmlSelectElement>() {
                let metric = metric_from_value(&sel.value());
                set_scatter_state.update(|s| s.set_axis_metric(Axis::X, metric));
            }
        }
    };

    let on_y_metric = move |ev: leptos::ev::Event| {
        if let Some(t) = ev.target() {
            if let Ok(sel) = t.dyn_into::<HtmlSelectElement>() {
                let metric = metric_from_value(&sel.value());
                set_scatter_state.update(|s| s.set_axis_metric(Axis::Y, metric));
            }
        }
    };

    let on_trend = move |ev: leptos::ev::Event| {
        if let Some(t) = ev.target() {
            if let Ok(inp) = t.dyn_into::<HtmlInputElement>() {
                set_scatter_state.update(|s| s.trend = inp.checked());
            }
        }
    };

    // Zoom text: four H:MM:SS times (x-lo,x-hi,y-lo,y-hi), fitted against
    // the unzoomed data bounds before it is applied.
    let on_apply_zoom = move |_ev: leptos::ev::MouseEvent| {
        let text = zoom_text.get_untracked();
        let parts: Vec<Option<f64>> = text.split(',').map(parse_hms).collect();
        let times: Vec<f64> = parts.into_iter().flatten().collect();
        if times.len() != 4 || times[0] >= times[1] || times[2] >= times[3] {
            set_status.set("Zoom needs 4 ascending times: x-lo,x-hi,y-lo,y-hi".to_string());
            return;
        }
        if let Some(data) = dataset.get_untracked() {
            let mut state = scatter_state.get_untracked();
            state.zoom = None;
            let full = scatter_view(&data, &state);
            let window = ZoomWindow {
                x: (times[0], times[1]),
                y: (times[2], times[3]),
            };
            let fitted = zoom_to(window, full.x_domain, full.y_domain);
            set_scatter_state.update(|s| s.zoom = Some(fitted));
        }
    };

    let on_reset_zoom = move |_ev: leptos::ev::MouseEvent| {
        set_scatter_state.update(|s| s.clear_zoom());
        set_zoom_text.set(String::new());
    };

    let athlete_options = move |selected: String, allow_empty: bool| {
        let names = athletes.get();
        let mut views: Vec<View> = Vec::new();
        if allow_empty {
            views.push(
                view! { <option value="" selected=selected.is_empty()>"(none)"</option> }
                    .into_view(),
            );
        }
        for name in names {
            let is_sel = name == selected;
            views.push(
                view! { <option value=name.clone() selected=is_sel>{name.clone()}</option> }
                    .into_view(),
            );
        }
        views.collect_view()
    };

    view! {
        <main class="tufte" on:dragover=move |e| { e.prevent_default(); } on:drop=move |e| {
            e.prevent_default();
            if let Ok(de) = e.dyn_into::<web_sys::DragEvent>() {
                if let Some(dt) = de.data_transfer() { if let Some(list) = dt.files() {
                    set_status.set("Reading file…".to_string());
                    spawn_local(async move {
                        if let Some((name, bytes)) = read_csv_from_list(&list).await {
                            load_bytes(name, bytes);
                        }
                    });
                }}
            }
        }>
            <header>
                <h1>"Triathlon Splits"</h1>
                <p class="subtitle">"Upload a results CSV to explore split times in your browser."</p>
                <p class="note">{"Web version "}{APP_VERSION}{" ("}{APP_COMMIT}{")"}</p>
            </header>
            <section class="controls">
                <label class="dropzone">
                    <span>"Drag & drop or click to choose a results CSV"</span>
                    <input id="file_input" type="file" accept=".csv" on:change=on_file />
                </label>
                <div class="control-row">
                    <label class="note">"Athlete:"</label>
                    <select on:change=on_athlete_a>
                        {move || athlete_options(
                            splits_state.get().map(|s| s.athlete_a).unwrap_or_default(),
                            false,
                        )}
                    </select>
                    <label class="note">"Compare with:"</label>
                    <select on:change=on_athlete_b>
                        {move || athlete_options(
                            splits_state.get().and_then(|s| s.athlete_b).unwrap_or_default(),
                            true,
                        )}
                    </select>
                </div>
                <div class="control-row">
                    <label class="note">"Scatter x:"</label>
                    <select on:change=on_x_metric prop:value=move || scatter_state.get().x_metric.to_string()>
                        <option value="Swim">"Swim"</option>
                        <option value="Bike">"Bike"</option>
                        <option value="Run">"Run"</option>
                    </select>
                    <label class="note">"y:"</label>
                    <select on:change=on_y_metric prop:value=move || scatter_state.get().y_metric.to_string()>
                        <option value="Swim">"Swim"</option>
                        <option value="Bike">"Bike"</option>
                        <option value="Run">"Run"</option>
                    </select>
                    <label><input type="checkbox" prop:checked=move || scatter_state.get().trend on:change=on_trend />" Trend line"</label>
                </div>
                <div class="control-row">
                    <label class="note">"Zoom (x-lo,x-hi,y-lo,y-hi):"</label>
                    <input type="text" placeholder="4:00:00,5:30:00,2:40:00,3:30:00"
                        prop:value=move || zoom_text.get()
                        on:input=move |ev| {
                            if let Some(t) = ev.target() {
                                if let Ok(inp) = t.dyn_into::<HtmlInputElement>() {
                                    set_zoom_text.set(inp.value());
                                }
                            }
                        } />
                    <button class="btn" on:click=on_apply_zoom>"Apply"</button>
                    <button class="btn" on:click=on_reset_zoom>"Reset"</button>
                </div>
                <span class="note">{move || status.get()}</span>
            </section>
            <section class="plots">
                <div id="splits_plot" class="plot"></div>
                <div id="scatter_plot" class="plot"></div>
                <div id="divisions_plot" class="plot"></div>
            </section>
            <section class="files">
                <p class="note">"Nothing leaves your device. All processing happens locally in your browser."</p>
            </section>
            <section class="downloads">
                <a id="dl_averages" href=move || csv_href.get() download="division_averages.csv"
                    style=move || if csv_href.get().is_empty() {"display:none;".to_string()} else {"display:inline;".to_string()}>
                    "Download division_averages.csv"
                </a>
            </section>
        </main>
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "chart_plotly")]
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <App/> });
}
