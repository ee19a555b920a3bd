//! Synchronous movement of one lane and boundary flow counting.

use crate::road::Cell;

/// Moves every vehicle in `input` forward by its velocity into `output`,
/// wrapping at the lane end. Returns how many vehicles crossed from the last
/// cell back to the first.
///
/// Vehicles are placed furthest-ahead first. Velocities must already respect
/// the gap to the vehicle ahead, which makes every destination unique.
pub fn move_vehicles_into(input: &[Cell], output: &mut [Cell]) -> u32 {
    debug_assert_eq!(input.len(), output.len());
    let length = input.len();
    output.fill(None);

    let mut flow_count = 0;
    for (pos, cell) in input.iter().enumerate().rev() {
        if let Some(v) = *cell {
            let mut new_pos = pos + v as usize;
            if new_pos >= length {
                flow_count += 1;
                new_pos %= length;
            }
            debug_assert!(
                output[new_pos].is_none(),
                "collision at cell {} moving from {} with v={}",
                new_pos,
                pos,
                v
            );
            output[new_pos] = Some(v);
        }
    }
    flow_count
}

/// Allocating form of [`move_vehicles_into`].
pub fn move_vehicles(lane: &[Cell]) -> (Vec<Cell>, u32) {
    let mut out = vec![None; lane.len()];
    let flow = move_vehicles_into(lane, &mut out);
    (out, flow)
}
