use std::fmt::{Display, Formatter};

use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use splitter::{
    directory::Directory,
    policy::{Policy, ProportionalPolicy},
    quantity::{Zero, current::Milliamps},
};

pub fn build_status_table(directory: &Directory) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Battery",
        "Kind",
        "Voltage",
        "Current",
        "SoC",
        "Estimated",
        "Capacity",
        "Charging",
        "Discharging",
    ]);
    for (_, battery) in directory.batteries() {
        let name = Cell::new(battery.name()).add_attribute(Attribute::Bold);
        let kind = Cell::new(battery.kind()).add_attribute(Attribute::Dim);
        match battery.get_status() {
            Ok(status) => table.add_row(vec![
                name,
                kind,
                Cell::new(status.voltage).set_alignment(CellAlignment::Right),
                Cell::new(status.current)
                    .set_alignment(CellAlignment::Right)
                    .fg(current_color(status.current)),
                Cell::new(status.state_of_charge).set_alignment(CellAlignment::Right),
                Cell::new(battery.get_estimated_soc())
                    .set_alignment(CellAlignment::Right)
                    .add_attribute(Attribute::Dim),
                Cell::new(status.max_capacity).set_alignment(CellAlignment::Right),
                Cell::new(status.max_charging_current).set_alignment(CellAlignment::Right),
                Cell::new(status.max_discharging_current).set_alignment(CellAlignment::Right),
            ]),
            Err(error) => table.add_row(vec![name, kind, Cell::new(error).fg(Color::Red)]),
        };
    }
    table
}

pub fn build_policy_table(policy: &ProportionalPolicy, directory: &Directory) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Policy",
        "Source",
        "Child",
        "SoC",
        "Capacity",
        "Charging",
        "Discharging",
        "Target",
    ]);
    for child in policy.get_children() {
        // The child may have been merged in the meantime:
        let (Ok(scale), Ok(current)) = (policy.scale_of(child), policy.current_of(child)) else {
            continue;
        };
        let child_name =
            directory.get(child).map_or_else(|| child.to_string(), |battery| battery.name().into());
        table.add_row(vec![
            Cell::new(policy.name()).add_attribute(Attribute::Bold),
            Cell::new(policy.splitter().source_name()).add_attribute(Attribute::Dim),
            Cell::new(child_name),
            share_cell(scale.state_of_charge()),
            share_cell(scale.max_capacity()),
            share_cell(scale.max_charge_rate()),
            share_cell(scale.max_discharge_rate()),
            Cell::new(current).set_alignment(CellAlignment::Right).fg(current_color(current)),
        ]);
    }
    table
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn current_color(current: Milliamps) -> Color {
    if current > Milliamps::ZERO {
        Color::DarkYellow
    } else if current < Milliamps::ZERO {
        Color::Green
    } else {
        Color::DarkGrey
    }
}

fn share_cell(share: f64) -> Cell {
    let cell = Cell::new(Share(share)).set_alignment(CellAlignment::Right);
    if share <= 0.0 { cell.add_attribute(Attribute::Dim) } else { cell }
}

/// Fraction of the source formatted as a percentage.
struct Share(f64);

impl Display for Share {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share() {
        assert_eq!(Share(0.125).to_string(), "12.5%");
        assert_eq!(Share(1.0).to_string(), "100.0%");
    }
}
