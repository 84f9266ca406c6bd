// SVG rendering of the final loom timelines.

use svg::node::element::{
    path::Data, Group, LinearGradient, Path, Rectangle, Stop, Style, Text, Title, SVG,
};
use svg::Document;

use crate::analyze::{MachineTimeline, ScheduleEntry};
use crate::setup::SetupKind;

const SCALE_MARGIN: usize = 50; // px
const LEFT_MARGIN: usize = SCALE_MARGIN + 20; // px
const TOP_HEADER_MARGIN: usize = 50; // px
const TOP_MARGIN: usize = TOP_HEADER_MARGIN + 20; // px
const RIGHT_MARGIN: usize = 30; // px
const BOTTOM_MARGIN: usize = 20; // px
const MACHINE_WIDTH: usize = 150; // px
const PIXELS_PER_HOUR: f64 = 2.0;
const MACHINE_SPACING: usize = 10; // px
const SCALE_STEP_HOURS: usize = 24;

pub fn render_schedule(machines: &[MachineTimeline]) -> String {
    let gradient = LinearGradient::new()
        .set("id", "background")
        .set("y1", "0")
        .set("y2", "1")
        .set("x1", "0")
        .set("x2", "0")
        .add(Stop::new().set("stop-color", "#eeeeee").set("offset", "5%"))
        .add(
            Stop::new()
                .set("stop-color", "#b0b0ee")
                .set("offset", "95%"),
        );

    let document = machines
        .iter()
        .enumerate()
        .map(|(index, timeline)| create_machine_header(index, &timeline.machine))
        .fold(
            Document::new()
                .set("version", "1.1")
                .set("xmlns", "http://www.w3.org/2000/svg")
                .set("xmlns:svg", "http://www.w3.org/2000/svg")
                .add(gradient)
                .add(Style::new(
                    r#"
    text { font-family:monospace; font-size:10px; fill:black; }
    #title { text-anchor:middle; font-size:25px; }
    .machine-header { text-anchor:middle; font-size:17px; }
    .job-box { stroke-width:1; stroke:black; }
    .setup-box { stroke-width:1; stroke:#333333; }
    .job-label { text-anchor:middle; dominant-baseline:middle; font-size:12px; fill:white; }
    .scale-label { text-anchor:end; dominant-baseline:middle; font-size:10px; }
    "#,
                ))
                // background
                .add(
                    Rectangle::new()
                        .set("x", 0)
                        .set("y", 0)
                        .set("width", "100%")
                        .set("height", "100%")
                        .set("fill", "url(#background)"),
                )
                // title
                .add(
                    Text::new("Loom Schedule")
                        .set("id", "title")
                        .set("x", "50%")
                        .set("y", 24),
                ),
            |doc, header| doc.add(header),
        );

    let (document, height) = add_timelines_to_doc(document, machines);

    let body = document
        .add(create_time_scale(height))
        .set(
            "width",
            LEFT_MARGIN + machines.len().max(1) * (MACHINE_WIDTH + MACHINE_SPACING)
                - MACHINE_SPACING
                + RIGHT_MARGIN,
        )
        .set("height", height + BOTTOM_MARGIN)
        .to_string();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
{body}"#
    )
}

fn add_timelines_to_doc(document: SVG, machines: &[MachineTimeline]) -> (SVG, usize) {
    machines.iter().enumerate().fold(
        (document, TOP_MARGIN),
        |(doc, max_height), (index, timeline)| {
            let x = LEFT_MARGIN + index * (MACHINE_WIDTH + MACHINE_SPACING);
            let (doc, height) = timeline
                .entries
                .iter()
                .fold((doc, TOP_MARGIN), |(doc, _), entry| {
                    add_entry_to_doc(doc, x, entry)
                });
            (doc, height.max(max_height))
        },
    )
}

fn add_entry_to_doc(document: SVG, x: usize, entry: &ScheduleEntry) -> (SVG, usize) {
    let setup_hours = f64::from(entry.setup_minutes) / 60.0;
    let setup_y = scaled(entry.start_hour - setup_hours);
    let job_y = scaled(entry.start_hour);
    let job_h = scaled(entry.start_hour + entry.duration_hours) - job_y;

    let setup_box = Rectangle::new()
        .set("x", x)
        .set("y", setup_y)
        .set("width", MACHINE_WIDTH)
        .set("height", job_y - setup_y)
        .set("fill", setup_fill(entry.setup_kind))
        .set("class", "setup-box");

    let job_box = Rectangle::new()
        .set("x", x)
        .set("y", job_y)
        .set("width", MACHINE_WIDTH)
        .set("height", job_h)
        .set("fill", "#0000f8")
        .set("class", "job-box");

    let job_label = Text::new(entry.item_id.clone())
        .set("x", x + MACHINE_WIDTH / 2)
        .set("y", job_y + job_h / 2)
        .set("class", "job-label");

    let tooltip = Title::new(format!(
        "{id}\n\ntype: {type_name}\nvariant: {variant}\nulak: {ulak}\n\
         quantity: {quantity:.0} m\nstart: {start:.1} h\nproduction: {duration:.1} h\nsetup: {setup_minutes} min",
        id = entry.item_id,
        type_name = entry.type_name,
        variant = entry.variant_code.as_deref().unwrap_or("-"),
        ulak = entry.ulak_code.as_deref().unwrap_or("-"),
        quantity = entry.quantity_meters,
        start = entry.start_hour,
        duration = entry.duration_hours,
        setup_minutes = entry.setup_minutes,
    ));

    let group = Group::new()
        .add(setup_box)
        .add(job_box)
        .add(job_label)
        .add(tooltip);

    (document.add(group), job_y + job_h)
}

fn setup_fill(kind: SetupKind) -> &'static str {
    match kind {
        SetupKind::Variant => "#88c988",
        SetupKind::Ulak => "#e0c060",
        SetupKind::Team => "#d07070",
    }
}

fn scaled(hour: f64) -> usize {
    TOP_MARGIN + (hour * PIXELS_PER_HOUR) as usize
}

fn create_machine_header(index: usize, label: &str) -> Text {
    let x = LEFT_MARGIN + index * (MACHINE_WIDTH + MACHINE_SPACING) + (MACHINE_WIDTH / 2);
    Text::new(label.to_string())
        .set("x", x)
        .set("y", TOP_HEADER_MARGIN)
        .set("width", "100%")
        .set("height", "100%")
        .set("class", "machine-header")
}

fn create_time_scale(height: usize) -> Group {
    let step = ((SCALE_STEP_HOURS as f64) * PIXELS_PER_HOUR) as usize;
    (0..=(height - TOP_MARGIN) / step.max(1))
        .map(|tick| {
            let y = TOP_MARGIN + tick * step;
            Group::new()
                .add(create_line(SCALE_MARGIN - 10, y, 10, 0))
                .add(
                    Text::new(format!("{} h", tick * SCALE_STEP_HOURS))
                        .set("x", SCALE_MARGIN - 15)
                        .set("y", y)
                        .set("class", "scale-label"),
                )
        })
        .fold(
            Group::new().add(create_line(SCALE_MARGIN, TOP_MARGIN, 0, height - TOP_MARGIN)),
            |group, line| group.add(line),
        )
}

fn create_line(x: usize, y: usize, w: usize, h: usize) -> Path {
    Path::new()
        .set("fill", "none")
        .set("stroke", "black")
        .set("stroke-width", 2)
        .set("d", Data::new().move_to((x, y)).line_by((w, h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{solve_result, RunStats};
    use crate::assign::Assigner;
    use crate::prepare::testing::item;

    #[test]
    fn rendered_document_contains_every_loom_and_item() {
        let items = vec![
            item("1_1", "1", 10.0, Some("V1"), None),
            item("2_1", "2", 12.0, Some("V2"), None),
        ];
        let assigner = Assigner::new(&items, 2);
        let result = solve_result(&assigner, &[0, 1], RunStats::default());
        let svg = render_schedule(&result.machines);

        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("mk101"));
        assert!(svg.contains("mk102"));
        assert!(svg.contains("1_1"));
        assert!(svg.contains("2_1"));
    }
}
